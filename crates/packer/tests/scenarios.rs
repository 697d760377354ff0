//! End-to-end pipeline scenarios over throwaway etmain trees.
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use packer::{pack, PackError, PackOptions, PackSummary};
use pakfs::CancelToken;

struct Fixture {
    temp: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let fixture = Self { temp };
        // Minimal base game: one shader and one plain resource.
        fixture.write_archive(
            "etmain/pak0.pk3",
            &[
                (
                    "scripts/base.shader",
                    "textures/base/wall\n{\n{\nmap textures/base/wall.tga\n}\n}\n",
                ),
                ("textures/base/wall.tga", "builtin"),
                ("sound/menu/click.wav", "builtin"),
            ],
        );
        fixture
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.temp.path().join(rel)
    }

    fn write(&self, rel: &str, contents: &str) {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn write_archive(&self, rel: &str, entries: &[(&str, &str)]) {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();
        for (name, contents) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(contents.as_bytes()).unwrap();
        }
        zip.finish().unwrap();
    }

    /// Writes `<root>/maps/<name>.map` with one brush face per shader token,
    /// plus the compiled `.bsp` next to it.
    fn write_map(&self, root: &str, name: &str, tokens: &[&str]) {
        let mut body = String::from("// entity 0\n{\n\"classname\" \"worldspawn\"\n");
        for token in tokens {
            body.push_str("// brush\n{\nbrushDef\n{\n");
            body.push_str(&format!(
                "( 64 0 0 ) ( 0 64 0 ) ( 0 0 64 ) ( ( 0.015 0 0 ) ( 0 0.015 0 ) ) {token} 0 0 0\n"
            ));
            body.push_str("}\n}\n");
        }
        body.push_str("}\n");
        self.write(&format!("{root}/maps/{name}.map"), &body);
        self.write(&format!("{root}/maps/{name}.bsp"), "BSP");
    }

    fn options(&self, root: &str, name: &str) -> PackOptions {
        PackOptions {
            map_file: self.path(&format!("{root}/maps/{name}.map")),
            output: Some(self.path("out.pk3")),
            overwrite: true,
            use_shaderlist: false,
            ..Default::default()
        }
    }

    fn pack(&self, options: &PackOptions) -> PackSummary {
        pack(options, &CancelToken::new()).expect("pack")
    }
}

fn entry_set(summary: &PackSummary) -> BTreeSet<String> {
    summary
        .entries
        .iter()
        .map(|entry| entry.as_str().to_string())
        .collect()
}

fn read_entry(path: &Path, entry: &str) -> String {
    let mut zip = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    let mut contents = String::new();
    zip.by_name(entry)
        .unwrap()
        .read_to_string(&mut contents)
        .unwrap();
    contents
}

fn archive_names(path: &Path) -> BTreeSet<String> {
    let zip = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    zip.file_names().map(str::to_string).collect()
}

#[test]
fn minimum_map_packs_bsp_and_texture() {
    let fixture = Fixture::new();
    fixture.write_map("etmain", "a", &["mymap/x"]);
    fixture.write("etmain/textures/mymap/x.tga", "tga");

    let summary = fixture.pack(&fixture.options("etmain", "a"));
    assert_eq!(
        entry_set(&summary),
        BTreeSet::from(["maps/a.bsp".to_string(), "textures/mymap/x.tga".to_string()])
    );
    assert_eq!(summary.warnings, 0);
    assert_eq!(archive_names(&summary.output), entry_set(&summary));
}

#[test]
fn remap_shader_pulls_in_target_definition() {
    let fixture = Fixture::new();
    fixture.write_map("etmain", "a", &["mymap/a"]);
    fixture.write(
        "etmain/scripts/mm.shader",
        "textures/mymap/a\n{\nq3map_remapShader textures/mymap/b\n}\n\
         textures/mymap/b\n{\n{\nmap textures/mymap/b.jpg\n}\n}\n",
    );
    fixture.write("etmain/textures/mymap/b.jpg", "jpg");

    let summary = fixture.pack(&fixture.options("etmain", "a"));
    assert_eq!(
        entry_set(&summary),
        BTreeSet::from([
            "maps/a.bsp".to_string(),
            "scripts/mm.shader".to_string(),
            "textures/mymap/b.jpg".to_string(),
        ])
    );
}

#[test]
fn builtin_content_is_suppressed() {
    let fixture = Fixture::new();
    fixture.write_map("etmain", "a", &["common/caulk", "base/wall"]);

    let summary = fixture.pack(&fixture.options("etmain", "a"));
    assert_eq!(
        entry_set(&summary),
        BTreeSet::from(["maps/a.bsp".to_string()])
    );
    assert_eq!(summary.warnings, 0);
}

#[test]
fn skybox_expands_to_six_sides_with_fallback() {
    let fixture = Fixture::new();
    fixture.write_map("etmain", "a", &["skies/desert"]);
    fixture.write(
        "etmain/scripts/sky.shader",
        "textures/skies/desert\n{\nskyparms env/desert - 512\n}\n",
    );
    for side in ["bk", "dn", "ft", "up"] {
        fixture.write(&format!("etmain/env/desert_{side}.tga"), "tga");
    }
    for side in ["rt", "lf"] {
        fixture.write(&format!("etmain/env/desert_{side}.jpg"), "jpg");
    }

    let summary = fixture.pack(&fixture.options("etmain", "a"));
    let entries = entry_set(&summary);
    for side in ["bk", "dn", "ft", "up"] {
        assert!(entries.contains(&format!("env/desert_{side}.tga")));
    }
    for side in ["rt", "lf"] {
        assert!(entries.contains(&format!("env/desert_{side}.jpg")));
    }
    assert!(entries.contains("scripts/sky.shader"));
    assert_eq!(summary.warnings, 0);
}

#[test]
fn missing_texture_is_soft_by_default_and_fatal_when_required() {
    let fixture = Fixture::new();
    fixture.write_map("etmain", "a", &["mymap/missing"]);

    let summary = fixture.pack(&fixture.options("etmain", "a"));
    assert_eq!(summary.warnings, 1);
    assert_eq!(
        entry_set(&summary),
        BTreeSet::from(["maps/a.bsp".to_string()])
    );

    let strict = PackOptions {
        require_all_assets: true,
        ..fixture.options("etmain", "a")
    };
    let err = pack(&strict, &CancelToken::new()).unwrap_err();
    assert!(matches!(err, PackError::MissingAsset(_)));
}

#[test]
fn map_root_pk3dir_definition_wins_over_etmain() {
    let fixture = Fixture::new();
    fixture.write_map("etmain/new.pk3dir", "demo", &["mymap/x"]);
    fixture.write(
        "etmain/new.pk3dir/scripts/s.shader",
        "textures/mymap/x\n{\n{\nmap textures/mymap/x.tga\n}\n}\n",
    );
    fixture.write(
        "etmain/scripts/s.shader",
        "textures/mymap/x\n{\n{\nmap textures/mymap/x_old.tga\n}\n}\n",
    );
    fixture.write("etmain/new.pk3dir/textures/mymap/x.tga", "new");

    let summary = fixture.pack(&fixture.options("etmain/new.pk3dir", "demo"));
    let entries = entry_set(&summary);
    assert!(entries.contains("scripts/s.shader"));
    assert!(entries.contains("textures/mymap/x.tga"));
    let script = read_entry(&summary.output, "scripts/s.shader");
    assert!(script.contains("textures/mymap/x.tga"));
    assert!(!script.contains("x_old"));
}

#[test]
fn active_archive_contributes_shader_and_texture() {
    let fixture = Fixture::new();
    fixture.write_map("etmain", "a", &["addon/crate"]);
    fixture.write_archive(
        "etmain/addon.pk3",
        &[
            (
                "scripts/addon.shader",
                "textures/addon/crate\n{\n{\nmap textures/addon/crate.tga\n}\n}\n",
            ),
            ("textures/addon/crate.tga", "crate"),
        ],
    );

    let options = PackOptions {
        load_archives: true,
        ..fixture.options("etmain", "a")
    };
    let summary = fixture.pack(&options);
    let entries = entry_set(&summary);
    assert!(entries.contains("scripts/addon.shader"));
    assert!(entries.contains("textures/addon/crate.tga"));
    assert_eq!(read_entry(&summary.output, "textures/addon/crate.tga"), "crate");
}

#[test]
fn auxiliary_scripts_ship_with_their_references() {
    let fixture = Fixture::new();
    fixture.write_map("etmain", "demo", &["mymap/x"]);
    fixture.write("etmain/textures/mymap/x.tga", "tga");
    fixture.write(
        "etmain/maps/demo.script",
        "game_manager\n{\n spawn\n {\n playsound sound/maps/demo/intro.wav\n }\n}\n",
    );
    fixture.write("etmain/sound/maps/demo/intro.wav", "wav");
    fixture.write("etmain/scripts/demo.arena", "{\n map \"demo\"\n}\n");
    fixture.write("etmain/levelshots/demo.jpg", "shot");

    let summary = fixture.pack(&fixture.options("etmain", "demo"));
    let entries = entry_set(&summary);
    assert!(entries.contains("maps/demo.script"));
    assert!(entries.contains("sound/maps/demo/intro.wav"));
    assert!(entries.contains("scripts/demo.arena"));
    assert!(entries.contains("levelshots/demo.jpg"));
    assert_eq!(summary.warnings, 0);
}

#[test]
fn excluded_archive_content_is_not_repacked() {
    let fixture = Fixture::new();
    fixture.write_map("etmain", "a", &["mymap/x"]);
    fixture.write_archive(
        "etmain/old.pk3",
        &[("textures/mymap/x.tga", "already shipped")],
    );

    let options = PackOptions {
        exclude_sources: vec!["old".into()],
        ..fixture.options("etmain", "a")
    };
    let summary = fixture.pack(&options);
    assert_eq!(
        entry_set(&summary),
        BTreeSet::from(["maps/a.bsp".to_string()])
    );
    assert_eq!(summary.warnings, 0);
}

#[test]
fn dry_run_resolves_without_writing() {
    let fixture = Fixture::new();
    fixture.write_map("etmain", "a", &["mymap/x"]);
    fixture.write("etmain/textures/mymap/x.tga", "tga");

    let options = PackOptions {
        dry_run: true,
        ..fixture.options("etmain", "a")
    };
    let summary = fixture.pack(&options);
    assert!(summary.dry_run);
    assert_eq!(summary.entries.len(), 2);
    assert!(!fixture.path("out.pk3").exists());
}

#[test]
fn missing_bsp_is_fatal() {
    let fixture = Fixture::new();
    fixture.write_map("etmain", "a", &["mymap/x"]);
    fs::remove_file(fixture.path("etmain/maps/a.bsp")).unwrap();
    fixture.write("etmain/textures/mymap/x.tga", "tga");

    let err = pack(&fixture.options("etmain", "a"), &CancelToken::new()).unwrap_err();
    assert!(matches!(err, PackError::MissingBsp(_)));
}

#[test]
fn lightmaps_and_style_shader_are_included() {
    let fixture = Fixture::new();
    fixture.write(
        "etmain/maps/lit.map",
        "// entity 0\n{\n\"classname\" \"worldspawn\"\n}\n\
         // entity 1\n{\n\"classname\" \"light\"\n\"style\" \"3\"\n}\n",
    );
    fixture.write("etmain/maps/lit.bsp", "BSP");
    fixture.write("etmain/maps/lit/lm_0000.tga", "lm");
    fixture.write("etmain/maps/lit/lm_0001.tga", "lm");
    fixture.write("etmain/scripts/q3map_lit.shader", "styles\n{\n}\n");

    let summary = fixture.pack(&fixture.options("etmain", "lit"));
    let entries = entry_set(&summary);
    assert!(entries.contains("maps/lit/lm_0000.tga"));
    assert!(entries.contains("maps/lit/lm_0001.tga"));
    assert!(entries.contains("scripts/q3map_lit.shader"));
}

#[test]
fn packing_twice_yields_the_same_entry_set() {
    let fixture = Fixture::new();
    fixture.write_map("etmain", "a", &["mymap/x"]);
    fixture.write("etmain/textures/mymap/x.tga", "tga");
    fixture.write(
        "etmain/scripts/mm.shader",
        "textures/mymap/x\n{\n{\nmap textures/mymap/x.tga\n}\n}\n",
    );

    let options = fixture.options("etmain", "a");
    let first = fixture.pack(&options);
    let second = fixture.pack(&options);
    assert_eq!(entry_set(&first), entry_set(&second));
    assert_eq!(archive_names(&first.output), entry_set(&second));
}

#[test]
fn cancellation_surfaces_as_canceled() {
    let fixture = Fixture::new();
    fixture.write_map("etmain", "a", &["mymap/x"]);

    let cancel = CancelToken::new();
    cancel.cancel();
    let err = pack(&fixture.options("etmain", "a"), &cancel).unwrap_err();
    assert!(err.is_canceled());
}
