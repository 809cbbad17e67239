use std::fs;
use std::path::Path;

use item_content::{CatalogLoader, ContentFactory};
use item_core::{DefinitionId, DefinitionOracle, Fragment, ItemTag, SlotTag, StackMethod};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), body).unwrap();
}

#[test]
fn bundled_catalog_loads_and_validates() {
    let factory = ContentFactory::new(Path::new(env!("CARGO_MANIFEST_DIR")).join("data"));
    let items = factory.load_items().unwrap();
    assert!(items.len() >= 8);

    let rifle = items.iter().find(|def| def.id == DefinitionId(1)).unwrap();
    assert!(rifle.declares_socket(&SlotTag::new("Optic")));
    assert_eq!(
        rifle.socket_slots().next().unwrap().default_occupant,
        Some(DefinitionId(2))
    );

    let suppressor = items.iter().find(|def| def.id == DefinitionId(4)).unwrap();
    assert!(suppressor.all_tags().any(|tag| tag == &ItemTag::new("quiet")));

    let ammo = items.iter().find(|def| def.id == DefinitionId(6)).unwrap();
    assert_eq!(ammo.stack_method, StackMethod::ByType { max_stacks: 60 });
}

#[test]
fn catalogs_directory_is_merged_into_the_base_catalog() {
    let dir = TempDir::new().unwrap();
    write(
        dir.path(),
        "items.ron",
        r#"(items: [(id: DefinitionId(1), name: "frame", fragments: [SocketSlots([(socket: "Core", default_occupant: Some(DefinitionId(10)))])])])"#,
    );
    fs::create_dir(dir.path().join("catalogs")).unwrap();
    write(
        &dir.path().join("catalogs"),
        "cores.ron",
        r#"(items: [(id: DefinitionId(10), name: "core", fragments: [Charges(initial: 5)])])"#,
    );
    write(&dir.path().join("catalogs"), "notes.txt", "ignored");

    let factory = ContentFactory::new(dir.path());
    let definitions = factory.load_definitions().unwrap();
    assert_eq!(definitions.len(), 2);
    let core = definitions.definition(DefinitionId(10)).unwrap();
    assert_eq!(core.fragments, vec![Fragment::Charges { initial: 5 }]);

    // the base file alone references a definition it does not contain
    assert!(factory.load_items().is_err());
}

#[test]
fn duplicate_ids_across_files_are_rejected() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.ron", r#"(items: [(id: DefinitionId(3), name: "first")])"#);
    write(dir.path(), "b.ron", r#"(items: [(id: DefinitionId(3), name: "second")])"#);

    let err = CatalogLoader::load_dir(dir.path()).unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("'first'"), "{message}");
    assert!(message.contains("'second'"), "{message}");
}

#[test]
fn malformed_ron_reports_the_file() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "items.ron", "(items: [(id: oops)])");

    let err = ContentFactory::new(dir.path()).load_items().unwrap_err();
    assert!(err.to_string().contains("items.ron"));
}

#[test]
fn missing_file_is_an_error() {
    let dir = TempDir::new().unwrap();
    assert!(CatalogLoader::load(&dir.path().join("absent.ron")).is_err());
}
