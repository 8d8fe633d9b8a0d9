mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use brandlens_core::analysis::{AiModel, PipelineStage};
use brandlens_db::models::analysis_pair::PairOutcome;
use brandlens_db::models::status::{PairStatus, RunStatus};
use brandlens_pipeline::{JobStore, PipelineConfig, StartRun, SWEEP_LOCK_NAME};
use chrono::Utc;
use common::{pair, Harness, BRAND_ID, USER_ID};
use uuid::Uuid;

#[tokio::test]
async fn stuck_run_resumes_from_first_incomplete_pair() {
    let h = Harness::new();
    let run = h
        .start(
            &[AiModel::ChatGpt, AiModel::Claude],
            &[PipelineStage::Tofu, PipelineStage::Mofu],
        )
        .await;
    h.deliver_next().await;
    // The next dispatch is lost and nothing happens for 15 minutes.
    h.dispatcher.pop();
    h.store.backdate(run.id, 15);

    assert_eq!(h.pipeline.sweeper.sweep().await, 1);

    let resumed = h.store.run(run.id);
    assert_eq!(resumed.resume_count, 1);
    assert_eq!(resumed.status(), Some(RunStatus::Running));

    let message = h.dispatcher.sent().last().cloned().unwrap();
    assert_eq!(message.current_pair, pair(AiModel::Claude, PipelineStage::Tofu));
    assert_eq!(
        message.remaining_pairs,
        vec![
            pair(AiModel::ChatGpt, PipelineStage::Mofu),
            pair(AiModel::Claude, PipelineStage::Mofu),
        ]
    );

    // Resumption counts as activity, so an immediate re-sweep finds nothing.
    assert_eq!(h.pipeline.sweeper.sweep().await, 0);

    h.drain().await;
    let done = h.store.run(run.id);
    assert_eq!(done.status(), Some(RunStatus::Completed));
    assert_eq!(done.result_count, 4);
    assert!(!h.locks.is_held(SWEEP_LOCK_NAME));
}

#[tokio::test]
async fn recent_runs_are_left_alone() {
    let h = Harness::new();
    let run = h.start(&[AiModel::Gemini], &[PipelineStage::Bofu]).await;
    h.dispatcher.pop();
    h.store.backdate(run.id, 5);

    assert_eq!(h.pipeline.sweeper.sweep().await, 0);
    assert_eq!(h.store.run(run.id).resume_count, 0);
    assert!(h.dispatcher.sent().len() == 1);
}

#[tokio::test]
async fn dead_claim_is_reclaimed_after_resume() {
    let h = Harness::new();
    let run = h.start(&[AiModel::Gemini], &[PipelineStage::Bofu]).await;
    let target = pair(AiModel::Gemini, PipelineStage::Bofu);
    h.dispatcher.pop();
    // An invocation claimed the pair and died.
    h.store
        .claim_pair(run.id, target, Uuid::new_v4(), Utc::now())
        .await
        .unwrap();
    h.store.backdate(run.id, 20);

    assert_eq!(h.pipeline.sweeper.sweep().await, 1);
    h.drain().await;

    assert_eq!(h.store.pair(run.id, target).attempts, 2);
    assert_eq!(h.store.run(run.id).status(), Some(RunStatus::Completed));
}

#[tokio::test]
async fn run_with_every_pair_finished_is_completed() {
    let h = Harness::new();
    let run = h
        .start(&[AiModel::ChatGpt, AiModel::Claude], &[PipelineStage::Tofu])
        .await;
    h.deliver_next().await;

    // The last pair finished but its invocation never reached the driver.
    let last = pair(AiModel::Claude, PipelineStage::Tofu);
    h.dispatcher.pop();
    let token = Uuid::new_v4();
    h.store
        .claim_pair(run.id, last, token, Utc::now())
        .await
        .unwrap();
    let recorded = h
        .store
        .record_outcome(
            &PairOutcome {
                run_id: run.id,
                pair: last,
                claim_token: token,
                status: PairStatus::Failed,
                error_message: Some("provider unavailable"),
            },
            None,
        )
        .await
        .unwrap();
    assert!(recorded);
    h.store.backdate(run.id, 15);

    assert_eq!(h.pipeline.sweeper.sweep().await, 1);

    let done = h.store.run(run.id);
    assert_eq!(done.status(), Some(RunStatus::Completed));
    assert_eq!(done.result_count, 1);
    assert_eq!(h.notifier.sent().len(), 1);
}

#[tokio::test]
async fn run_out_of_resume_attempts_is_failed() {
    let h = Harness::new();
    let run = h.start(&[AiModel::Perplexity], &[PipelineStage::Tofu]).await;
    h.dispatcher.pop();
    h.store.set_resume_count(run.id, 3);
    h.store.backdate(run.id, 30);

    assert_eq!(h.pipeline.sweeper.sweep().await, 1);

    let failed = h.store.run(run.id);
    assert_eq!(failed.status(), Some(RunStatus::Failed));
    assert!(failed
        .error_message
        .unwrap()
        .contains("abandoned after 3 resume attempts"));
    assert_eq!(h.dispatcher.pending(), 0);
    assert_eq!(h.notifier.sent()[0].subject, "Brand analysis failed: Acme");
}

#[tokio::test]
async fn sweep_yields_to_another_holder() {
    let h = Harness::new();
    let run = h.start(&[AiModel::Claude], &[PipelineStage::Tofu]).await;
    h.dispatcher.pop();
    h.store.backdate(run.id, 15);
    h.locks.hold(SWEEP_LOCK_NAME, "other-instance", Duration::from_secs(60));

    assert_eq!(h.pipeline.sweeper.sweep().await, 0);
    assert_eq!(h.store.run(run.id).resume_count, 0);

    // Once the other holder's lease runs out the sweep proceeds.
    h.locks.expire(SWEEP_LOCK_NAME);
    assert_eq!(h.pipeline.sweeper.sweep().await, 1);
}

#[tokio::test]
async fn concurrent_sweeps_recover_each_run_once() {
    let h = Harness::new();
    let run = h.start(&[AiModel::Claude], &[PipelineStage::Tofu]).await;
    h.dispatcher.pop();
    h.store.backdate(run.id, 15);

    let (a, b) = tokio::join!(h.pipeline.sweeper.sweep(), h.pipeline.sweeper.sweep());

    assert_eq!(a + b, 1);
    assert_eq!(h.store.run(run.id).resume_count, 1);
    assert_eq!(h.dispatcher.pending(), 1);
}

#[tokio::test]
async fn crashed_batch_still_releases_the_lock() {
    let h = Harness::new();
    let run = h.start(&[AiModel::Claude], &[PipelineStage::Tofu]).await;
    h.dispatcher.pop();
    h.store.backdate(run.id, 15);
    h.store.crash_listing.store(true, Ordering::SeqCst);

    assert_eq!(h.pipeline.sweeper.sweep().await, 0);
    assert!(!h.locks.is_held(SWEEP_LOCK_NAME));

    // The next trigger is not locked out.
    h.store.crash_listing.store(false, Ordering::SeqCst);
    assert_eq!(h.pipeline.sweeper.sweep().await, 1);
    assert_eq!(h.store.run(run.id).resume_count, 1);
}

#[tokio::test]
async fn unavailable_lock_storage_skips_the_sweep() {
    let h = Harness::new();
    let run = h.start(&[AiModel::Claude], &[PipelineStage::Tofu]).await;
    h.dispatcher.pop();
    h.store.backdate(run.id, 15);
    h.locks.unavailable.store(true, Ordering::SeqCst);

    assert_eq!(h.pipeline.sweeper.sweep().await, 0);
    assert_eq!(h.store.run(run.id).resume_count, 0);
}

#[tokio::test]
async fn batch_size_bounds_one_sweep() {
    let h = Harness::with_config(PipelineConfig {
        sweep_batch_size: 1,
        ..PipelineConfig::default()
    });
    let first = h.start(&[AiModel::Claude], &[PipelineStage::Tofu]).await;
    let second = h
        .pipeline
        .driver
        .start(StartRun {
            brand_id: BRAND_ID + 1,
            user_id: USER_ID,
            models: vec![AiModel::Claude],
            stages: vec![PipelineStage::Tofu],
        })
        .await
        .unwrap();
    h.dispatcher.pop();
    h.dispatcher.pop();
    h.store.backdate(first.id, 30);
    h.store.backdate(second.id, 20);

    assert_eq!(h.pipeline.sweeper.sweep().await, 1);
    // Oldest first.
    assert_eq!(h.store.run(first.id).resume_count, 1);
    assert_eq!(h.store.run(second.id).resume_count, 0);

    assert_eq!(h.pipeline.sweeper.sweep().await, 1);
    assert_eq!(h.store.run(second.id).resume_count, 1);
    assert_eq!(h.pipeline.sweeper.sweep().await, 0);
}

#[tokio::test]
async fn one_bad_run_does_not_stop_the_batch() {
    let h = Harness::new();
    let first = h.start(&[AiModel::Claude], &[PipelineStage::Tofu]).await;
    let second = h
        .pipeline
        .driver
        .start(StartRun {
            brand_id: BRAND_ID + 1,
            user_id: USER_ID,
            models: vec![AiModel::Claude],
            stages: vec![PipelineStage::Tofu],
        })
        .await
        .unwrap();
    h.dispatcher.pop();
    h.dispatcher.pop();
    h.store.backdate(first.id, 30);
    h.store.backdate(second.id, 20);
    h.dispatcher.failing.store(true, Ordering::SeqCst);

    // Both re-dispatches fail; each run is still marked resumed.
    assert_eq!(h.pipeline.sweeper.sweep().await, 0);
    assert_eq!(h.store.run(first.id).resume_count, 1);
    assert_eq!(h.store.run(second.id).resume_count, 1);
}
