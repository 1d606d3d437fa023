//! Integration tests for content identity and duplicate resolution

mod helpers;

use helpers::{memory_task, TestEnv, TestPlugin};
use stash_ai::models::{ImportParameters, ItemOutcome};
use tokio_util::sync::CancellationToken;

const SKIN_INI: &[u8] = b"[General]\nName: Blue";

#[tokio::test]
async fn test_reimport_reuses_existing_record() {
    let env = TestEnv::new().await;
    let cancel = CancellationToken::new();
    let files: &[(&str, &[u8])] = &[("skin.ini", SKIN_INI), ("cursor.png", b"png-bytes")];

    let first = env
        .importer
        .import_one(memory_task("blue", files), ImportParameters::default(), &cancel)
        .await
        .unwrap()
        .unwrap();
    let blobs_after_first = env.catalog.count_stored_files().await.unwrap();

    let outcome = env
        .importer
        .import_item(memory_task("blue", files), ImportParameters::default(), &cancel, None)
        .await;

    match outcome {
        ItemOutcome::Reused(model) => {
            assert_eq!(model.id, first.id);
            assert_eq!(model.hash, first.hash);
            assert_eq!(model.file_signature(), first.file_signature());
        }
        other => panic!("Expected reuse, got {:?}", other),
    }

    assert_eq!(env.catalog.count_models(true).await.unwrap(), 1);
    assert_eq!(env.catalog.count_stored_files().await.unwrap(), blobs_after_first);
    assert_eq!(blobs_after_first, 2);
}

#[tokio::test]
async fn test_batch_reimport_takes_fast_path() {
    let env = TestEnv::new().await;
    let files: &[(&str, &[u8])] = &[("skin.ini", SKIN_INI), ("hit.wav", b"wav")];

    let first = env
        .importer
        .import_tasks(vec![memory_task("blue", files)], ImportParameters::batch())
        .await
        .unwrap();
    assert_eq!(env.plugin.populate_calls(), 1);

    let second = env
        .importer
        .import_tasks(vec![memory_task("blue", files)], ImportParameters::batch())
        .await
        .unwrap();

    assert_eq!(second.len(), 1);
    assert_eq!(second[0].id, first[0].id);
    // Nothing staged or populated the second time
    assert_eq!(env.plugin.populate_calls(), 1);
    assert_eq!(env.catalog.count_models(true).await.unwrap(), 1);
}

#[tokio::test]
async fn test_same_names_different_content_are_distinct() {
    let env = TestEnv::new().await;

    let models = env
        .importer
        .import_tasks(
            vec![
                memory_task("red", &[("skin.ini", b"[General]\nName: Red")]),
                memory_task("green", &[("skin.ini", b"[General]\nName: Green")]),
            ],
            ImportParameters::default(),
        )
        .await
        .unwrap();

    assert_eq!(models.len(), 2);
    assert_ne!(models[0].hash, models[1].hash);
    assert_eq!(env.catalog.count_models(false).await.unwrap(), 2);
}

#[tokio::test]
async fn test_same_concatenated_content_collides_and_replaces() {
    let env = TestEnv::new().await;
    let cancel = CancellationToken::new();

    let original = env
        .importer
        .import_one(
            memory_task("split", &[("a.ini", b"ab"), ("b.ini", b"cd")]),
            ImportParameters::default(),
            &cancel,
        )
        .await
        .unwrap()
        .unwrap();

    let replacement = env
        .importer
        .import_one(
            memory_task("joined", &[("a.ini", b"abcd")]),
            ImportParameters::default(),
            &cancel,
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(original.hash, replacement.hash);
    assert_ne!(original.id, replacement.id);

    let old = env.catalog.load_model(original.id).await.unwrap().unwrap();
    assert!(old.delete_pending);
    assert_eq!(env.catalog.count_models(false).await.unwrap(), 1);
    assert_eq!(env.catalog.count_models(true).await.unwrap(), 2);

    let active = env.catalog.find_existing(&original.hash).await.unwrap().unwrap();
    assert_eq!(active.id, replacement.id);
}

#[tokio::test]
async fn test_batch_fast_hash_hit_with_different_files_replaces() {
    let env = TestEnv::new().await;

    let original = env
        .importer
        .import_tasks(
            vec![memory_task("pack", &[("skin.ini", SKIN_INI), ("old.png", b"old")])],
            ImportParameters::batch(),
        )
        .await
        .unwrap()
        .remove(0);

    // Same hashable content, so the fast hash matches; the file set does not
    let replacement = env
        .importer
        .import_tasks(
            vec![memory_task("pack", &[("skin.ini", SKIN_INI), ("new.png", b"new")])],
            ImportParameters::batch(),
        )
        .await
        .unwrap()
        .remove(0);

    assert_eq!(replacement.hash, original.hash);
    assert_ne!(replacement.id, original.id);
    assert_eq!(replacement.sorted_filenames(), vec!["new.png", "skin.ini"]);
    assert!(env
        .catalog
        .load_model(original.id)
        .await
        .unwrap()
        .unwrap()
        .delete_pending);
}

#[tokio::test]
async fn test_import_undeletes_soft_deleted_match() {
    let env = TestEnv::new().await;
    let cancel = CancellationToken::new();
    let files: &[(&str, &[u8])] = &[("skin.ini", SKIN_INI)];

    let original = env
        .importer
        .import_one(memory_task("blue", files), ImportParameters::default(), &cancel)
        .await
        .unwrap()
        .unwrap();
    assert!(env.catalog.soft_delete(original.id).await.unwrap());
    assert_eq!(env.catalog.count_models(false).await.unwrap(), 0);

    let restored = env
        .importer
        .import_one(memory_task("blue again", files), ImportParameters::default(), &cancel)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(restored.id, original.id);
    assert!(!restored.delete_pending);
    assert_eq!(env.catalog.count_models(true).await.unwrap(), 1);
    assert!(!env.catalog.load_model(original.id).await.unwrap().unwrap().delete_pending);
}

#[tokio::test]
async fn test_batch_fast_path_undeletes_soft_deleted_match() {
    let env = TestEnv::new().await;
    let files: &[(&str, &[u8])] = &[("skin.ini", SKIN_INI), ("a.png", b"a")];

    let original = env
        .importer
        .import_tasks(vec![memory_task("blue", files)], ImportParameters::batch())
        .await
        .unwrap()
        .remove(0);
    env.catalog.soft_delete(original.id).await.unwrap();

    let restored = env
        .importer
        .import_tasks(vec![memory_task("blue", files)], ImportParameters::batch())
        .await
        .unwrap()
        .remove(0);

    assert_eq!(restored.id, original.id);
    assert!(!restored.delete_pending);
    assert_eq!(env.plugin.populate_calls(), 1);
    assert_eq!(env.catalog.count_models(false).await.unwrap(), 1);
}

#[tokio::test]
async fn test_population_rewrite_is_rechecked_before_commit() {
    // Population writes the same definition file the first import shipped,
    // so only the post-population check can see the duplicate
    let plugin = TestPlugin::new().rewriting("bare", "skin.ini", SKIN_INI);
    let env = TestEnv::with_plugin(plugin).await;
    let cancel = CancellationToken::new();

    let shipped = env
        .importer
        .import_one(
            memory_task("shipped", &[("skin.ini", SKIN_INI)]),
            ImportParameters::default(),
            &cancel,
        )
        .await
        .unwrap()
        .unwrap();

    let outcome = env
        .importer
        .import_item(
            memory_task("bare", &[]),
            ImportParameters::default(),
            &cancel,
            None,
        )
        .await;

    match outcome {
        ItemOutcome::Reused(model) => assert_eq!(model.id, shipped.id),
        other => panic!("Expected reuse after rewrite, got {:?}", other),
    }
    assert_eq!(env.catalog.count_models(true).await.unwrap(), 1);
}

#[tokio::test]
async fn test_archive_without_hashable_files_uses_name_identity() {
    let env = TestEnv::new().await;

    let models = env
        .importer
        .import_tasks(
            vec![
                memory_task("one", &[("a.png", b"same")]),
                memory_task("two", &[("a.png", b"same")]),
            ],
            ImportParameters::default(),
        )
        .await
        .unwrap();

    assert_eq!(models.len(), 2);
    assert!(!models[0].hash.is_empty());
    assert_ne!(models[0].hash, models[1].hash);
}

#[tokio::test]
async fn test_batch_fast_path_matches_renamed_model_without_hashable_files() {
    // Nothing hashable, so identity falls back to the archive's name even
    // though population renames the model
    let plugin = TestPlugin::new().renaming("Blue Sky.osk", "Blue Sky");
    let env = TestEnv::with_plugin(plugin).await;
    let files: &[(&str, &[u8])] = &[("a.png", b"png")];

    let first = env
        .importer
        .import_tasks(vec![memory_task("Blue Sky.osk", files)], ImportParameters::batch())
        .await
        .unwrap()
        .remove(0);
    assert_eq!(first.name, "Blue Sky");

    let second = env
        .importer
        .import_tasks(vec![memory_task("Blue Sky.osk", files)], ImportParameters::batch())
        .await
        .unwrap()
        .remove(0);

    assert_eq!(second.id, first.id);
    assert_eq!(env.plugin.populate_calls(), 1);
}

#[tokio::test]
async fn test_failed_commit_leaves_superseded_record_untouched() {
    let env = TestEnv::with_plugin(TestPlugin::new().failing_post_import("joined")).await;
    let cancel = CancellationToken::new();

    let original = env
        .importer
        .import_one(
            memory_task("split", &[("a.ini", b"ab"), ("b.ini", b"cd")]),
            ImportParameters::default(),
            &cancel,
        )
        .await
        .unwrap()
        .unwrap();

    // "joined" collides on hash with a different file set, so it would
    // supersede "split" if its commit went through
    let models = env
        .importer
        .import_tasks(
            vec![
                memory_task("joined", &[("a.ini", b"abcd")]),
                memory_task("sibling", &[("c.ini", b"other")]),
            ],
            ImportParameters::default(),
        )
        .await
        .unwrap();

    assert_eq!(models.len(), 1);
    assert_eq!(models[0].name, "sibling");

    let old = env.catalog.load_model(original.id).await.unwrap().unwrap();
    assert!(!old.delete_pending);
    assert_eq!(old.name, "split");

    let mut names: Vec<String> = env
        .catalog
        .all_models(true)
        .await
        .unwrap()
        .into_iter()
        .map(|m| m.name)
        .collect();
    names.sort();
    assert_eq!(names, vec!["sibling", "split"]);

    let active = env.catalog.find_existing(&original.hash).await.unwrap().unwrap();
    assert_eq!(active.id, original.id);
}
