mod common;

use common::{
    fast_flow, secret, small_catalog, small_plan, FakeDriver, FakeState, LOGIN_ID, TARGET_ID,
};
use retenciones_export::error::{AppError, DriverError, ValidationError};
use retenciones_export::models::{
    BatchStatus, CatalogEntry, DateRange, OperationMode, WorkPlan,
};
use retenciones_export::{
    BatchOrchestrator, CheckpointStore, ItemOutcome, StopSignal, VariantOutcome,
};
use std::path::Path;

fn driver_with(configure: impl FnOnce(&mut FakeState)) -> FakeDriver {
    let driver = FakeDriver::new();
    configure(&mut driver.state.borrow_mut());
    driver
}

fn orchestrator(
    driver: FakeDriver,
    checkpoints: &Path,
    output: &Path,
) -> BatchOrchestrator<FakeDriver> {
    BatchOrchestrator::new(driver, CheckpointStore::in_dir(checkpoints), fast_flow(output))
}

#[tokio::test]
async fn test_fresh_run_downloads_every_variant() {
    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(FakeDriver::new(), &dir.path().join("cp"), &dir.path().join("out"));

    let result = orch.run(&small_plan(), &secret(), None).await.unwrap();

    assert_eq!(result.status, BatchStatus::Completed);
    assert!(!result.stopped);
    assert_eq!(result.completed_count, 3);
    assert_eq!(result.total_count, 3);
    // IMP_219 有两个变体
    assert_eq!(result.artifact_paths.len(), 4);
    assert!(result.failed_variants().is_empty());

    let first = &result.artifact_paths[0];
    let name = first.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("MR_IMP_172_30500010912_01012024_31032024_"));
    assert_eq!(std::fs::read_to_string(first).unwrap(), "csv for IMP_172");

    let driver = orch.driver();
    assert_eq!(driver.count_calls(&format!("login:{}", LOGIN_ID)), 1);
    assert_eq!(driver.count_calls("select_target:30500010912"), 1);
    assert_eq!(
        driver.calls().last().unwrap(),
        &format!("close_session:{}:retain=false", result.session_id)
    );

    let record = orch.store().load(&result.session_id).unwrap().unwrap();
    assert_eq!(record.status, BatchStatus::Completed);
    assert!(record.current_key.is_none());
    assert_eq!(record.all_artifact_paths, result.artifact_paths);
}

#[tokio::test]
async fn test_stopped_run_resumes_with_remaining_items() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoints = dir.path().join("cp");
    let output = dir.path().join("out");
    let plan = small_plan();

    // 第一次运行：IMP_219 的第二个文件下载后请求停止
    let stop = StopSignal::new();
    let first_driver = driver_with(|s| s.stop_after_downloads = Some((3, stop.clone())));
    let first = orchestrator(first_driver, &checkpoints, &output).with_stop_signal(stop);
    let stopped = first.run(&plan, &secret(), None).await.unwrap();

    assert!(stopped.stopped);
    assert_eq!(stopped.status, BatchStatus::InProgress);
    assert_eq!(stopped.items.len(), 2);
    assert_eq!(stopped.artifact_paths.len(), 3);
    assert_eq!(
        first.driver().calls().last().unwrap(),
        &format!("close_session:{}:retain=true", stopped.session_id)
    );

    let record = first.store().load(&stopped.session_id).unwrap().unwrap();
    assert_eq!(record.status, BatchStatus::InProgress);
    assert!(record.is_completed("IMP_172"));
    assert!(record.is_completed("IMP_219"));
    assert!(!record.is_completed("ADU_767"));

    // 第二次运行：只处理 ADU_767
    let second = orchestrator(FakeDriver::new(), &checkpoints, &output);
    let resumed = second
        .run(&plan, &secret(), Some(&stopped.session_id))
        .await
        .unwrap();

    assert_eq!(resumed.session_id, stopped.session_id);
    assert_eq!(resumed.status, BatchStatus::Completed);
    assert_eq!(resumed.skipped_count(), 2);
    assert_eq!(resumed.items[2].0, "ADU_767");
    assert_eq!(resumed.artifact_paths.len(), 4);
    assert_eq!(resumed.artifact_paths[..3], stopped.artifact_paths[..]);

    let driver = second.driver();
    assert_eq!(driver.count_calls("click:#selectImpuestos-multiselect-option-IMP_"), 0);
    assert_eq!(driver.count_calls("click:#selectImpuestos-multiselect-option-ADU_767"), 1);
    assert_eq!(driver.count_calls("open_session:"), 1);
}

#[tokio::test]
async fn test_session_loss_leaves_error_checkpoint_that_can_be_resumed() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoints = dir.path().join("cp");
    let output = dir.path().join("out");
    let plan = small_plan();

    let failing = orchestrator(
        driver_with(|s| s.lose_session_on = Some("IMP_219".to_string())),
        &checkpoints,
        &output,
    );
    let err = failing.run(&plan, &secret(), None).await.unwrap_err();
    assert!(matches!(err, AppError::Driver(DriverError::SessionLost { .. })));

    let record = failing.store().find_resumable(&plan).unwrap().unwrap();
    assert_eq!(record.status, BatchStatus::Error);
    assert_eq!(record.current_key.as_deref(), Some("IMP_219"));
    assert!(record.is_completed("IMP_172"));
    assert_eq!(record.all_artifact_paths.len(), 1);
    assert_eq!(
        failing.driver().calls().last().unwrap(),
        &format!("close_session:{}:retain=true", record.session_id)
    );

    let retry = orchestrator(FakeDriver::new(), &checkpoints, &output);
    let result = retry
        .run(&plan, &secret(), Some(&record.session_id))
        .await
        .unwrap();

    assert_eq!(result.session_id, record.session_id);
    assert_eq!(result.status, BatchStatus::Completed);
    assert_eq!(result.items[0], ("IMP_172".to_string(), ItemOutcome::Skipped));
    assert_eq!(result.artifact_paths.len(), 4);
    assert_eq!(result.artifact_paths[0], record.all_artifact_paths[0]);
}

#[tokio::test]
async fn test_completed_session_is_not_resumed() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoints = dir.path().join("cp");
    let output = dir.path().join("out");
    let plan = small_plan();

    let first = orchestrator(FakeDriver::new(), &checkpoints, &output)
        .run(&plan, &secret(), None)
        .await
        .unwrap();

    let second = orchestrator(FakeDriver::new(), &checkpoints, &output);
    let result = second
        .run(&plan, &secret(), Some(&first.session_id))
        .await
        .unwrap();

    assert_ne!(result.session_id, first.session_id);
    assert_eq!(result.skipped_count(), 0);
    assert_eq!(second.store().list_records().unwrap().len(), 2);
}

#[tokio::test]
async fn test_resume_with_different_items_starts_new_session() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoints = dir.path().join("cp");
    let output = dir.path().join("out");
    let plan = small_plan();

    // IMP_172 下载完成后停止
    let stop = StopSignal::new();
    let first = orchestrator(
        driver_with(|s| s.stop_after_downloads = Some((1, stop.clone()))),
        &checkpoints,
        &output,
    )
    .with_stop_signal(stop);
    let stopped = first.run(&plan, &secret(), None).await.unwrap();
    assert_eq!(stopped.status, BatchStatus::InProgress);
    let before = first.store().load(&stopped.session_id).unwrap().unwrap();

    // 只包含一个事项的计划不能接管整个批次的检查点
    let single = WorkPlan::single(
        &small_catalog(),
        "IMP_172",
        plan.date_range,
        LOGIN_ID,
        TARGET_ID,
    )
    .unwrap();
    let second = orchestrator(FakeDriver::new(), &checkpoints, &output);
    let result = second
        .run(&single, &secret(), Some(&stopped.session_id))
        .await
        .unwrap();

    assert_ne!(result.session_id, stopped.session_id);
    assert_eq!(result.status, BatchStatus::Completed);
    assert!(second.store().find_resumable(&single).unwrap().is_none());

    // 原检查点保持原样，仍可恢复
    let after = second.store().load(&stopped.session_id).unwrap().unwrap();
    assert_eq!(after, before);
    assert_eq!(after.status, BatchStatus::InProgress);
    assert!(!after.is_completed("IMP_219"));
    assert_eq!(
        second.store().find_resumable(&plan).unwrap().unwrap().session_id,
        stopped.session_id
    );
}

#[tokio::test]
async fn test_catalog_change_never_loses_completed_items() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoints = dir.path().join("cp");
    let output = dir.path().join("out");
    let plan = small_plan();

    let failing = orchestrator(
        driver_with(|s| s.lose_session_on = Some("ADU_767".to_string())),
        &checkpoints,
        &output,
    );
    failing.run(&plan, &secret(), None).await.unwrap_err();
    let crashed = failing.store().find_resumable(&plan).unwrap().unwrap();
    assert_eq!(crashed.status, BatchStatus::Error);
    assert_eq!(crashed.completed_keys.len(), 2);

    // 两次运行之间目录多了一个税种
    let mut entries = small_catalog().entries().to_vec();
    entries.push(CatalogEntry::new(
        "IMP_939",
        "939 - GANANCIAS - REGIMEN DE INFORMACION",
        "Impositivas",
        OperationMode::Retencion,
    ));
    let grown = WorkPlan::batch(
        &retenciones_export::Catalog::new(entries),
        plan.date_range,
        LOGIN_ID,
        TARGET_ID,
    )
    .unwrap();

    let other = orchestrator(FakeDriver::new(), &checkpoints, &output);
    let result = other
        .run(&grown, &secret(), Some(&crashed.session_id))
        .await
        .unwrap();
    assert_ne!(result.session_id, crashed.session_id);
    assert_eq!(
        other.store().load(&crashed.session_id).unwrap().unwrap(),
        crashed
    );

    // 用原计划恢复：之前完成的事项全部保留
    let resumed = orchestrator(FakeDriver::new(), &checkpoints, &output);
    let done = resumed
        .run(&plan, &secret(), Some(&crashed.session_id))
        .await
        .unwrap();
    assert_eq!(done.session_id, crashed.session_id);
    assert_eq!(done.status, BatchStatus::Completed);

    let record = resumed.store().load(&crashed.session_id).unwrap().unwrap();
    assert!(record.completed_keys.is_superset(&crashed.completed_keys));
    assert!(record.is_completed("ADU_767"));
}

#[tokio::test]
async fn test_failed_variant_does_not_abort_batch() {
    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(
        driver_with(|s| s.broken_downloads = vec!["IMP_219".to_string()]),
        &dir.path().join("cp"),
        &dir.path().join("out"),
    );

    let result = orch.run(&small_plan(), &secret(), None).await.unwrap();

    assert_eq!(result.status, BatchStatus::Completed);
    assert_eq!(result.completed_count, 3);
    assert_eq!(result.artifact_paths.len(), 2);

    let failed = result.failed_variants();
    assert_eq!(failed.len(), 2);
    assert!(failed.iter().all(|(key, _, _)| *key == "IMP_219"));
    assert_eq!(failed[0].1, "Retención");
    assert_eq!(failed[1].1, "Percepción");

    match &result.items[2].1 {
        ItemOutcome::Processed(outcomes) => {
            assert!(matches!(outcomes[0], VariantOutcome::Succeeded(_)));
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    // 每个变体结束后都回到新查询页签
    assert_eq!(orch.driver().count_calls("click:button#tabNuevaConsulta-tab"), 4);
}

#[tokio::test]
async fn test_inverted_date_range_is_rejected_before_any_session() {
    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(FakeDriver::new(), &dir.path().join("cp"), &dir.path().join("out"));

    let mut plan = small_plan();
    plan.date_range = DateRange {
        start: plan.date_range.end,
        end: plan.date_range.start,
    };

    let err = orch.run(&plan, &secret(), None).await.unwrap_err();

    assert!(matches!(
        err,
        AppError::Validation(ValidationError::DateRangeInverted { .. })
    ));
    assert!(orch.driver().calls().is_empty());
    assert!(orch.store().list_records().unwrap().is_empty());
}

#[tokio::test]
async fn test_rejected_login_never_leaks_the_secret() {
    let dir = tempfile::tempdir().unwrap();
    let orch = orchestrator(
        driver_with(|s| s.login_rejected = true),
        &dir.path().join("cp"),
        &dir.path().join("out"),
    );

    let err = orch.run(&small_plan(), &secret(), None).await.unwrap_err();

    assert!(matches!(err, AppError::Driver(DriverError::LoginFailed { .. })));
    assert!(!err.to_string().contains(secret().expose()));

    let records = orch.store().list_records().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, BatchStatus::Error);
    assert!(records[0].completed_keys.is_empty());
}
