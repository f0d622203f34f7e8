use std::path::{Path, PathBuf};

use super::*;

const MANIFEST: &str = r#"
id = "ella:quick-reply"
name = "Quick Reply Tweaks"
version = "1.2"
type = "modification"

[[install]]
for = "2.0-2.0.99"

[[install.action]]
kind = "readme"
lang = "english"
text = "readme.txt"

[[install.action]]
kind = "modification"
format = "boardmod"
text = "install.mod"

[[install]]
for = "2.1.*"

[[install.action]]
kind = "modification"
text = "install21.toml"

[[uninstall]]

[[uninstall.action]]
kind = "modification"
reverse = true
text = "install21.toml"
"#;

#[test]
fn toml_document_fetches_attributes_text_and_children() {
    let document = TomlDocument::from_toml_str(
        r#"
[[file]]
name = "$sourcedir/Post.php"
error = "skip"

[[file.operation]]
add = "// added"

[[file.operation.search]]
position = "after"
text = "function Post()"

[[file.operation]]
search = ["plain one", "plain two"]
"#,
    )
    .expect("document must parse");

    assert!(document.exists("file"));
    assert_eq!(
        document.fetch("file/@name").as_deref(),
        Some("$sourcedir/Post.php")
    );

    let files = document.children("", "file");
    assert_eq!(files.len(), 1);
    let operations = files[0].children(".", "operation");
    assert_eq!(operations.len(), 2);
    assert_eq!(operations[0].fetch("add").as_deref(), Some("// added"));

    let searches = operations[0].children("", "search");
    assert_eq!(searches[0].fetch("@position").as_deref(), Some("after"));
    assert_eq!(searches[0].fetch(".").as_deref(), Some("function Post()"));

    let plain = operations[1].children("", "search");
    assert_eq!(plain.len(), 2);
    assert_eq!(plain[1].fetch(".").as_deref(), Some("plain two"));
    assert!(!plain[1].exists("@position"));
    assert!(!operations[1].exists("add"));
}

#[test]
fn toml_document_flag_accepts_booleans_and_strings() {
    let document = TomlDocument::from_toml_str("a = true\nb = \"true\"\nc = \"no\"\n")
        .expect("document must parse");
    assert!(document.flag("@a"));
    assert!(document.flag("b"));
    assert!(!document.flag("c"));
    assert!(!document.flag("missing"));
}

#[test]
fn parse_manifest_and_blocks_in_declaration_order() {
    let manifest = PackageManifest::from_toml_str(MANIFEST).expect("manifest must parse");
    assert_eq!(manifest.id, "ella:quick-reply");
    assert_eq!(manifest.version, "1.2");
    assert_eq!(manifest.package_type.as_deref(), Some("modification"));

    let installs = manifest.method_blocks(InstallMode::Install);
    assert_eq!(installs.len(), 2);
    assert_eq!(installs[0].fetch("@for").as_deref(), Some("2.0-2.0.99"));
    assert_eq!(installs[1].fetch("@for").as_deref(), Some("2.1.*"));
    assert!(manifest.has_method(InstallMode::Uninstall));
    assert!(!manifest.has_method(InstallMode::Upgrade));

    let actions = installs[0].children("", "action");
    assert_eq!(actions.len(), 2);
    assert_eq!(actions[1].fetch("@kind").as_deref(), Some("modification"));
    assert_eq!(actions[1].fetch("@format").as_deref(), Some("boardmod"));
}

#[test]
fn manifest_without_id_is_rejected() {
    let err = PackageManifest::from_toml_str("name = \"nameless\"\n")
        .expect_err("manifest without id must fail");
    assert!(err.to_string().contains("missing a package id"));
}

#[test]
fn manifest_with_scalar_action_is_rejected() {
    let err = PackageManifest::from_toml_str(
        "id = \"a:b\"\n[[install]]\naction = [\"readme.txt\"]\n",
    )
    .expect_err("non-table action must fail");
    assert!(format!("{err:#}").contains("action #1 must be a table"));
}

#[test]
fn install_mode_parses_case_insensitively() {
    assert_eq!("Upgrade".parse::<InstallMode>().ok(), Some(InstallMode::Upgrade));
    assert!("reinstall".parse::<InstallMode>().is_err());
}

#[test]
fn action_kind_round_trips_manifest_names() {
    for kind in [
        ActionKind::CreateFile,
        ActionKind::RequireDir,
        ActionKind::MoveFile,
        ActionKind::Modification,
        ActionKind::Requires,
        ActionKind::License,
    ] {
        assert_eq!(ActionKind::parse(kind.as_str()), Some(kind));
    }
    assert_eq!(ActionKind::parse("chmod"), None);
    assert_eq!(ActionKind::parse("teleport"), None);
    assert!(ActionKind::RemoveDir.is_removal());
    assert!(ActionKind::MoveDir.takes_source());
    assert!(!ActionKind::CreateFile.takes_source());
}

#[test]
fn unknown_action_records_tag() {
    let action = Action::unknown("teleport");
    assert_eq!(action.kind, ActionKind::Error);
    assert_eq!(
        action.detail,
        ActionDetail::Unknown {
            tag: "teleport".to_string()
        }
    );
}

#[test]
fn path_context_expands_longest_variable_first() {
    let context = PathContext::new()
        .with_variable(THEME_DIR, "/srv/forum/Themes/default")
        .with_variable(THEMES_DIR, "/srv/forum/Themes")
        .with_variable(BOARD_DIR, "/srv/forum");

    assert_eq!(
        context.resolve("$themedir/Display.template.php"),
        PathBuf::from("/srv/forum/Themes/default/Display.template.php")
    );
    assert_eq!(
        context.resolve("$themes_dir/core/index.php"),
        PathBuf::from("/srv/forum/Themes/core/index.php")
    );
    assert_eq!(context.resolve("$boarddir"), PathBuf::from("/srv/forum"));
    assert_eq!(
        context.resolve("$boarddirectory/x"),
        PathBuf::from("$boarddirectory/x")
    );
    assert_eq!(context.resolve("plain/file.php"), PathBuf::from("plain/file.php"));
    assert_eq!(
        context.display_relative(Path::new("/srv/forum/Sources/Post.php")),
        "./Sources/Post.php"
    );
}

#[test]
fn installer_config_defaults_and_theme_resolution() {
    let config = InstallerConfig::from_toml_str(
        r#"
product_version = "2.1.4"
board_dir = "/srv/forum"

[[themes]]
id = 2
name = "Curve"
dir = "Themes/curve"

[[themes]]
id = 1
name = "Default"
dir = "Themes/default"
"#,
    )
    .expect("config must parse");

    assert_eq!(config.language, "english");
    assert!(!config.make_backups);
    assert_eq!(config.source_dir(), PathBuf::from("/srv/forum/Sources"));

    let themes = config.themes();
    assert_eq!(themes.len(), 2);
    assert!(themes[0].is_default());
    assert_eq!(themes[1].theme_dir, PathBuf::from("/srv/forum/Themes/curve"));

    let context = config.path_context(Path::new("/tmp/stage"));
    assert_eq!(
        context.resolve("$imagesdir/icon.png"),
        PathBuf::from("/srv/forum/Themes/default/images/icon.png")
    );
    assert_eq!(
        context.resolve("$package/readme.txt"),
        PathBuf::from("/tmp/stage/readme.txt")
    );
}

#[test]
fn installer_config_requires_default_theme_when_themes_listed() {
    let err = InstallerConfig::from_toml_str(
        "product_version = \"2.1\"\nboard_dir = \"/srv\"\n[[themes]]\nid = 3\nname = \"x\"\ndir = \"t\"\n",
    )
    .expect_err("config without default theme must fail");
    assert!(err.to_string().contains("default id 1"));
}

#[test]
fn installer_config_synthesizes_default_theme() {
    let config =
        InstallerConfig::from_toml_str("product_version = \"2.1\"\nboard_dir = \"/srv\"\n")
            .expect("config must parse");
    let themes = config.themes();
    assert_eq!(themes.len(), 1);
    assert_eq!(themes[0].theme_dir, PathBuf::from("/srv/Themes/default"));
    assert!(default_theme(&themes).is_some());
    assert_eq!(custom_themes(&themes).count(), 0);
}
