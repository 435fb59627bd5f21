//! Provisioning of per-identity overlays.

use std::sync::Arc;

use modsync_core::SyncPathSpec;
use modsync_fs::NormalizedPath;
use modsync_server::{Error, OverlayStore};
use modsync_test_utils::TestTree;

fn store(tree: &TestTree) -> Arc<OverlayStore> {
    Arc::new(OverlayStore::new(
        NormalizedPath::new(tree.path("RemotePlugins")),
        "DefaultPlugins",
    ))
}

fn leftovers(tree: &TestTree) -> Vec<String> {
    std::fs::read_dir(tree.path("RemotePlugins"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".tmp"))
        .collect()
}

#[test]
fn seed_copies_live_sync_paths() {
    let tree = TestTree::new();
    tree.write("BepInEx/plugins/a.dll", "a")
        .write("BepInEx/config/a.cfg", "cfg")
        .write("BepInEx/patchers/p.dll", "untracked");
    let store = store(&tree);
    let specs = vec![
        SyncPathSpec::new("BepInEx/plugins"),
        SyncPathSpec::new("BepInEx/config/a.cfg"),
        SyncPathSpec::new("user/mods"),
    ];

    let created = store
        .ensure_default_seed(&NormalizedPath::new(tree.root()), &specs)
        .unwrap();

    assert!(created);
    tree.assert_content("RemotePlugins/DefaultPlugins/BepInEx/plugins/a.dll", "a");
    tree.assert_content("RemotePlugins/DefaultPlugins/BepInEx/config/a.cfg", "cfg");
    tree.assert_not_exists("RemotePlugins/DefaultPlugins/BepInEx/patchers");
    tree.assert_not_exists("RemotePlugins/DefaultPlugins/user");
    assert!(leftovers(&tree).is_empty());
}

#[test]
fn existing_seed_is_left_alone() {
    let tree = TestTree::new();
    tree.write("BepInEx/plugins/a.dll", "live")
        .write("RemotePlugins/DefaultPlugins/BepInEx/plugins/a.dll", "curated");
    let store = store(&tree);

    let created = store
        .ensure_default_seed(
            &NormalizedPath::new(tree.root()),
            &[SyncPathSpec::new("BepInEx/plugins")],
        )
        .unwrap();

    assert!(!created);
    tree.assert_content("RemotePlugins/DefaultPlugins/BepInEx/plugins/a.dll", "curated");
}

#[tokio::test]
async fn provisioning_copies_the_seed() {
    let tree = TestTree::new();
    tree.write("RemotePlugins/DefaultPlugins/BepInEx/plugins/a.dll", "seeded");
    let store = store(&tree);

    let dir = store.provision("alice").await.unwrap();

    assert_eq!(dir, store.root().join("alice"));
    tree.assert_content("RemotePlugins/alice/BepInEx/plugins/a.dll", "seeded");
}

#[tokio::test]
async fn provisioning_without_seed_starts_empty() {
    let tree = TestTree::new();
    tree.mkdir("RemotePlugins");
    let store = store(&tree);

    store.provision("carol").await.unwrap();

    tree.assert_exists("RemotePlugins/carol");
    assert!(std::fs::read_dir(tree.path("RemotePlugins/carol")).unwrap().next().is_none());
}

#[tokio::test]
async fn existing_overlay_is_not_recopied() {
    let tree = TestTree::new();
    tree.write("RemotePlugins/DefaultPlugins/a.dll", "seeded")
        .write("RemotePlugins/dave/a.dll", "customised");
    let store = store(&tree);

    store.provision("dave").await.unwrap();

    tree.assert_content("RemotePlugins/dave/a.dll", "customised");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_requests_create_one_overlay() {
    let tree = TestTree::new();
    for i in 0..20 {
        tree.write(&format!("RemotePlugins/DefaultPlugins/BepInEx/plugins/{i}.dll"), "x");
    }
    let store = store(&tree);

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move { store.provision("erin").await })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let copied = std::fs::read_dir(tree.path("RemotePlugins/erin/BepInEx/plugins"))
        .unwrap()
        .count();
    assert_eq!(copied, 20);
    assert!(leftovers(&tree).is_empty());
}

#[tokio::test]
async fn hostile_identities_are_rejected() {
    let tree = TestTree::new();
    let store = store(&tree);

    for identity in ["..", "a/b", "a\\b", "DefaultPlugins"] {
        assert!(
            matches!(store.provision(identity).await, Err(Error::InvalidIdentity { .. })),
            "identity {identity:?} should be rejected"
        );
    }
}
