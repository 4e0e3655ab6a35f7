//! Concurrent claims against a file-backed SQLite database, where every pooled
//! connection is a real, independent writer.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tempfile::TempDir;
use uuid::Uuid;

use pricewatch::db::Database;
use pricewatch::model::JobStatus;
use pricewatch::scrapers::ScraperRegistry;
use pricewatch::worker::Worker;

const CLAIMERS: usize = 8;

async fn setup_file_db() -> (TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}", dir.path().join("queue.db").display());
    let db = Database::connect(&url).await.unwrap();
    db.run_migrations().await.unwrap();
    (dir, db)
}

fn worker(db: &Database) -> Arc<Worker> {
    Arc::new(Worker::new(
        Arc::new(db.clone()),
        Arc::new(ScraperRegistry::new()),
    ))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn one_pending_job_is_claimed_exactly_once() {
    let (_dir, db) = setup_file_db().await;
    let worker = worker(&db);

    for round in 0..10 {
        let id = db.insert_request("http://store.com/item").await.unwrap();

        let tasks = (0..CLAIMERS).map(|_| {
            let worker = worker.clone();
            tokio::spawn(async move { worker.claim_job().await })
        });
        let results: Vec<_> = join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap())
            .collect();

        let errors: Vec<_> = results.iter().filter(|r| r.is_err()).collect();
        assert!(errors.is_empty(), "round {round}: claim errors {errors:?}");
        let winners: Vec<Uuid> = results
            .into_iter()
            .filter_map(|r| r.unwrap())
            .map(|job| job.id)
            .collect();
        assert_eq!(winners, vec![id], "round {round}");

        let stored = db.get_request(id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Processing);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claimers_drain_the_queue_without_overlap() {
    let (_dir, db) = setup_file_db().await;
    let mut queued = HashSet::new();
    for n in 0..20 {
        queued.insert(db.insert_request(&format!("http://store.com/{n}")).await.unwrap());
    }
    let worker = worker(&db);

    let tasks = (0..CLAIMERS).map(|_| {
        let worker = worker.clone();
        tokio::spawn(async move {
            let mut claimed = Vec::new();
            while let Some(job) = worker.claim_job().await.unwrap() {
                claimed.push(job.id);
            }
            claimed
        })
    });
    let claimed: Vec<Uuid> = join_all(tasks)
        .await
        .into_iter()
        .flat_map(|joined| joined.unwrap())
        .collect();

    let unique: HashSet<Uuid> = claimed.iter().copied().collect();
    assert_eq!(claimed.len(), 20);
    assert_eq!(unique, queued);
}
