// ==========================================
// 关联解析集成测试
// ==========================================
// 测试目标: 验证导入过程中的关联查找、判重、关联与失败隔离
// ==========================================

mod test_helpers;

use record_import::domain::JobStatus;
use record_import::importer::MSG_ALREADY_RELATED;
use record_import::logging;
use record_import::repository::EntityStore;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use test_helpers::{attrs, FaultyEntityStore, TestEnv};

#[tokio::test]
async fn test_missing_owner_scenario() {
    logging::init_test();
    let env = TestEnv::new();
    env.store
        .create("Owner", attrs(&[("email", "someone@x.io")]))
        .await
        .unwrap();

    let (job_id, result) = env
        .import_pets("id,name,ownerEmail\n1,Rex,nobody@x.io\n")
        .await;
    let report = result.expect("import failed");
    assert_eq!(report.created, 1);
    assert_eq!(report.failed_rows, 0);

    let pet = env.find_pet("1").await.unwrap();
    assert!(env.store.list_related(&pet, "owner").await.unwrap().is_empty());

    let job = env.job(&job_id).await;
    assert_eq!(job.status, JobStatus::Finished);
    assert_eq!(job.warnings.len(), 1);
    assert_eq!(
        job.warnings[0].message,
        "tried to relate nonexistent instance of owner"
    );
    assert!(job.errors.is_empty());
}

#[tokio::test]
async fn test_relations_attached_by_kind() {
    let env = TestEnv::new();
    let alice = env
        .store
        .create("Owner", attrs(&[("email", "alice@x.io")]))
        .await
        .unwrap();
    let bob = env
        .store
        .create("Owner", attrs(&[("email", "bob@x.io")]))
        .await
        .unwrap();
    let cute = env
        .store
        .create("Tag", attrs(&[("label", "cute")]))
        .await
        .unwrap();
    let loud = env
        .store
        .create("Tag", attrs(&[("label", "loud")]))
        .await
        .unwrap();

    let csv = "id,ownerEmail,tag\n\
               1,alice@x.io,cute\n\
               1,bob@x.io,loud\n";
    let (job_id, result) = env.import_pets(csv).await;
    result.expect("import failed");

    let pet = env.find_pet("1").await.unwrap();
    // 单槽引用被覆盖
    let owners = env.store.list_related(&pet, "owner").await.unwrap();
    assert!(!owners.contains(&alice));
    assert_eq!(owners, vec![bob]);
    // 多对多累加
    assert_eq!(
        env.store.list_related(&pet, "tags").await.unwrap(),
        vec![cute, loud]
    );

    let job = env.job(&job_id).await;
    // 仅第 2 行的 upsert 警告
    assert_eq!(job.warnings.len(), 1);
    assert!(job.errors.is_empty());
}

#[tokio::test]
async fn test_existing_relation_warns_once_per_relation() {
    let env = TestEnv::new();
    env.store
        .create("Owner", attrs(&[("email", "alice@x.io")]))
        .await
        .unwrap();
    env.store
        .create("Tag", attrs(&[("label", "cute")]))
        .await
        .unwrap();

    let csv = "id,ownerEmail,tag\n1,alice@x.io,cute\n";
    let (_, first) = env.import_pets(csv).await;
    first.expect("first run failed");
    let (job_id, second) = env.import_pets(csv).await;
    second.expect("second run failed");

    let pet = env.find_pet("1").await.unwrap();
    assert_eq!(env.store.list_related(&pet, "owner").await.unwrap().len(), 1);
    assert_eq!(env.store.list_related(&pet, "tags").await.unwrap().len(), 1);

    let job = env.job(&job_id).await;
    let messages: Vec<&str> = job.warnings.iter().map(|w| w.message.as_str()).collect();
    assert_eq!(
        messages,
        vec![
            "entity already exists, updating fields to new values",
            MSG_ALREADY_RELATED,
            MSG_ALREADY_RELATED,
        ]
    );
}

#[tokio::test]
async fn test_relation_failure_is_isolated() {
    let env = TestEnv::new();
    env.store
        .create("Tag", attrs(&[("label", "cute")]))
        .await
        .unwrap();
    let faulty = Arc::new(FaultyEntityStore::new(env.store.clone(), "boom@x.io"));

    let csv = "id,ownerEmail,tag\n1,boom@x.io,cute\n2,,cute\n";
    let (job_id, result) = env.import_pets_with_store(csv, faulty).await;
    let report = result.expect("import failed");

    assert_eq!(report.created, 2);
    assert_eq!(report.failed_rows, 1);

    // 失败的 owner 不影响同一行的 tags
    let pet1 = env.find_pet("1").await.unwrap();
    assert_eq!(env.store.list_related(&pet1, "tags").await.unwrap().len(), 1);
    assert!(env.store.list_related(&pet1, "owner").await.unwrap().is_empty());

    let pet2 = env.find_pet("2").await.unwrap();
    assert_eq!(env.store.list_related(&pet2, "tags").await.unwrap().len(), 1);

    let job = env.job(&job_id).await;
    assert_eq!(job.status, JobStatus::Finished);
    assert_eq!(job.errors.len(), 1);
    assert_eq!(job.errors[0].row_number, 1);
    assert!(job.errors[0].message.contains("owner"));
    assert!(job.warnings.is_empty());
}

async fn seed_owner_and_tag(env: &TestEnv) {
    env.store
        .create("Owner", attrs(&[("email", "alice@x.io")]))
        .await
        .unwrap();
    env.store
        .create("Tag", attrs(&[("label", "cute")]))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_attach_failure_is_isolated() {
    let env = TestEnv::new();
    seed_owner_and_tag(&env).await;
    let faulty = Arc::new(FaultyEntityStore::new(env.store.clone(), "-").fail_attach_on("owner"));

    let (job_id, result) = env
        .import_pets_with_store("id,ownerEmail,tag\n1,alice@x.io,cute\n", faulty.clone())
        .await;
    let report = result.expect("import failed");

    assert_eq!(report.created, 1);
    assert_eq!(report.failed_rows, 1);
    assert_eq!(faulty.failures.load(Ordering::SeqCst), 1);

    let pet = env.find_pet("1").await.unwrap();
    assert!(env.store.list_related(&pet, "owner").await.unwrap().is_empty());
    assert_eq!(env.store.list_related(&pet, "tags").await.unwrap().len(), 1);

    let job = env.job(&job_id).await;
    assert_eq!(job.status, JobStatus::Finished);
    assert_eq!(job.errors.len(), 1);
    assert_eq!(job.errors[0].row_number, 1);
    assert!(job.errors[0].message.contains("owner"));
    assert!(!job.errors[0].message.contains("tags"));
    assert!(job.warnings.is_empty());
}

#[tokio::test]
async fn test_check_failure_is_isolated() {
    let env = TestEnv::new();
    seed_owner_and_tag(&env).await;
    let faulty = Arc::new(FaultyEntityStore::new(env.store.clone(), "-").fail_check_on("tags"));

    let (job_id, result) = env
        .import_pets_with_store("id,ownerEmail,tag\n1,alice@x.io,cute\n", faulty.clone())
        .await;
    let report = result.expect("import failed");

    assert_eq!(report.created, 1);
    assert_eq!(report.failed_rows, 1);

    let pet = env.find_pet("1").await.unwrap();
    assert_eq!(env.store.list_related(&pet, "owner").await.unwrap().len(), 1);
    assert!(env.store.list_related(&pet, "tags").await.unwrap().is_empty());

    let job = env.job(&job_id).await;
    assert_eq!(job.errors.len(), 1);
    assert_eq!(job.errors[0].row_number, 1);
    assert!(job.errors[0].message.contains("tags"));
    assert!(!job.errors[0].message.contains("owner"));
}

#[tokio::test]
async fn test_undeclared_relation_spec_ignored() {
    let env = TestEnv::new();
    let mut def = test_helpers::pet_type_def();
    def.relation_specs.insert(
        "vet".to_string(),
        [("name", "vetName")].into_iter().collect(),
    );
    env.config.register_entity_type(&def).unwrap();

    let job_id = env.create_job("Pet").await;
    let file = test_helpers::write_csv(env.dir.path(), "pets.csv", "id,vetName\n1,Dr. Who\n");
    env.importer_with_store(env.store.clone())
        .run(&job_id, &def, &file)
        .await
        .expect("import failed");

    let job = env.job(&job_id).await;
    assert!(job.warnings.is_empty());
    assert!(job.errors.is_empty());
}
