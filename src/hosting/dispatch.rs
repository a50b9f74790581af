use anyhow::bail;
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use tokio::time::{Duration, interval};
use tracing::{debug, info};

use crate::hosting::item::{OperationResult, WorkItem};
use crate::hosting::progress::{ItemState, ProgressTracker};
use crate::hosting::{ClientError, SessionClient, checksum};

type Task<'a> = BoxFuture<'a, Result<OperationResult, ClientError>>;

/// Uploads every item concurrently, reporting each result as it lands.
pub async fn upload_batch<T: ProgressTracker>(
    client: &SessionClient,
    items: Vec<WorkItem>,
    tracker: &T,
) -> anyhow::Result<()> {
    let tasks = items
        .into_iter()
        .map(|item| client.upload(item).boxed())
        .collect();
    drive(tasks, tracker).await
}

/// Downloads every hosted link concurrently into `dest_dir`.
///
/// A bad HTTP status only fails its own item; the rest of the batch carries on.
pub async fn download_batch<T: ProgressTracker>(
    client: &SessionClient,
    items: Vec<WorkItem>,
    dest_dir: &Path,
    with_checksum: bool,
    tracker: &T,
) -> anyhow::Result<()> {
    let links = items
        .iter()
        .map(|item| item.link().map(str::to_string))
        .collect::<Result<Vec<_>, _>>()?;
    let tasks = links
        .into_iter()
        .map(move |link| {
            async move {
                let result = client.download_file(&link, dest_dir).await?;
                if with_checksum {
                    append_checksum(result).await
                } else {
                    Ok(result)
                }
            }
            .boxed()
        })
        .collect();
    drive(tasks, tracker).await
}

/// Deletes every hosted link with a single request and returns the service's reply.
pub async fn delete_batch(
    client: &SessionClient,
    items: &[WorkItem],
    userhash: &str,
) -> anyhow::Result<String> {
    let links = items
        .iter()
        .map(WorkItem::link)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(client.delete_files(links.as_slice(), userhash).await?)
}

async fn append_checksum(result: OperationResult) -> Result<OperationResult, ClientError> {
    match result {
        OperationResult::Success { label, payload } => {
            let path = PathBuf::from(&payload);
            let digest = checksum::hash_file(&path)
                .await
                .map_err(|err| ClientError::io(&path, err))?;
            Ok(OperationResult::Success {
                label,
                payload: format!("{payload} (sha256 {})", hex::encode(digest)),
            })
        }
        failure => Ok(failure),
    }
}

/// Polls every task at once and handles results in completion order.
///
/// An `Err` from any task aborts the batch: the remaining tasks are dropped
/// unfinished and the error is returned.
async fn drive<T: ProgressTracker>(tasks: Vec<Task<'_>>, tracker: &T) -> anyhow::Result<()> {
    let total = tasks.len();
    info!(total, "batch started");
    let mut in_flight: FuturesUnordered<_> = tasks
        .into_iter()
        .enumerate()
        .map(|(index, task)| async move { (index, task.await) })
        .collect();
    for index in 0..total {
        tracker.set_item_state(index, ItemState::InFlight);
    }

    let interrupted = tracker.interrupted();
    let mut interrupt_interval = interval(Duration::from_millis(500));
    let mut failed = 0;
    loop {
        tokio::select! {
            next = in_flight.next() => {
                match next {
                    Some((index, Ok(result))) => {
                        debug!(index, label = result.label(), "item finished");
                        let line = result.to_string();
                        if result.is_success() {
                            tracker.set_item_state(index, ItemState::Succeeded);
                            tracker.report(&line);
                        } else {
                            failed += 1;
                            tracker.set_item_state(index, ItemState::Failed);
                            tracker.warn(&line);
                        }
                    }
                    Some((index, Err(err))) => {
                        tracker.set_item_state(index, ItemState::Failed);
                        tracker.abandon("Batch aborted.");
                        return Err(anyhow::Error::new(err).context("Batch aborted"));
                    }
                    None => break,
                }
            }
            _ = interrupt_interval.tick() => {
                if interrupted.load(Ordering::SeqCst) {
                    let err_message = "Batch interrupted.";
                    tracker.abandon(err_message);
                    bail!(err_message);
                }
            }
        }
    }
    info!(total, failed, "batch finished");
    tracker.finish(&format!("{} done, {failed} failed.", total - failed));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClientConfig;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::{Arc, Mutex};
    use url::Url;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct RecordingTracker {
        lines: Mutex<Vec<String>>,
        warnings: Mutex<Vec<String>>,
        states: Mutex<HashMap<usize, ItemState>>,
        completed: AtomicUsize,
        interrupted: Arc<AtomicBool>,
        outcome: Mutex<Option<String>>,
    }

    impl ProgressTracker for RecordingTracker {
        fn interrupted(&self) -> Arc<AtomicBool> {
            self.interrupted.clone()
        }

        fn set_item_state(&self, index: usize, state: ItemState) {
            let mut states = self.states.lock().unwrap();
            let previous = states.insert(index, state);
            assert!(
                !previous.is_some_and(ItemState::is_terminal),
                "item {index} finished twice"
            );
            if state.is_terminal() {
                self.completed.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn report(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }

        fn warn(&self, line: &str) {
            self.warnings.lock().unwrap().push(line.to_string());
        }

        fn finish(&self, msg: &str) {
            *self.outcome.lock().unwrap() = Some(format!("finished: {msg}"));
        }

        fn abandon(&self, msg: &str) {
            *self.outcome.lock().unwrap() = Some(format!("abandoned: {msg}"));
        }
    }

    fn client_for(base: &str) -> SessionClient {
        SessionClient::new(ClientConfig::new(
            Url::parse(&format!("{base}/user/api.php")).unwrap(),
            Url::parse(&format!("{base}/")).unwrap(),
            None,
        ))
        .unwrap()
    }

    fn hosted(names: &[&str]) -> Vec<WorkItem> {
        names
            .iter()
            .map(|name| WorkItem::HostedLink {
                url: name.to_string(),
            })
            .collect()
    }

    #[tokio::test]
    async fn every_upload_reported_once_whatever_the_order() {
        let server = MockServer::start().await;
        let delays = [400, 50, 250, 0, 150];
        for (i, delay) in delays.iter().enumerate() {
            Mock::given(method("POST"))
                .and(body_string_contains(format!("item-{i}")))
                .respond_with(
                    ResponseTemplate::new(200)
                        .set_body_string(format!("https://files.catbox.moe/up{i}.bin"))
                        .set_delay(Duration::from_millis(*delay)),
                )
                .expect(1)
                .mount(&server)
                .await;
        }

        let client = client_for(&server.uri());
        let items = (0..delays.len())
            .map(|i| WorkItem::RemoteUrl {
                url: format!("https://example.com/item-{i}"),
            })
            .collect();
        let tracker = RecordingTracker::default();
        upload_batch(&client, items, &tracker).await.unwrap();
        client.close();

        assert_eq!(tracker.completed.load(Ordering::SeqCst), delays.len());
        let mut lines = tracker.lines.lock().unwrap().clone();
        lines.sort();
        let mut expected: Vec<_> = (0..delays.len())
            .map(|i| format!("https://example.com/item-{i} -> https://files.catbox.moe/up{i}.bin"))
            .collect();
        expected.sort();
        assert_eq!(lines, expected);
        assert!(tracker.warnings.lock().unwrap().is_empty());
        assert!(
            tracker
                .states
                .lock()
                .unwrap()
                .values()
                .all(|state| *state == ItemState::Succeeded)
        );
    }

    #[tokio::test]
    async fn one_missing_download_does_not_stop_the_others() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/a.txt"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("alpha")
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/b.txt"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/c.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("gamma"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = client_for(&server.uri());
        let tracker = RecordingTracker::default();
        let missing = format!("{}/b.txt", server.uri());
        let items = hosted(&["a.txt", missing.as_str(), "c.txt"]);
        download_batch(&client, items, dir.path(), false, &tracker)
            .await
            .unwrap();
        client.close();

        assert_eq!(tracker.completed.load(Ordering::SeqCst), 3);
        assert_eq!(tracker.lines.lock().unwrap().len(), 2);
        assert_eq!(
            *tracker.warnings.lock().unwrap(),
            vec![format!(
                "* Error while downloading {}/b.txt: 404 Not Found",
                server.uri()
            )]
        );
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "alpha");
        assert_eq!(std::fs::read_to_string(dir.path().join("c.txt")).unwrap(), "gamma");
        assert!(!dir.path().join("b.txt").exists());
        assert_eq!(tracker.states.lock().unwrap()[&1], ItemState::Failed);
        assert_eq!(
            tracker.outcome.lock().unwrap().as_deref(),
            Some("finished: 2 done, 1 failed.")
        );
    }

    #[tokio::test]
    async fn checksum_is_appended_to_saved_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/abc.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("abc"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let client = client_for(&server.uri());
        let tracker = RecordingTracker::default();
        download_batch(&client, hosted(&["abc.txt"]), dir.path(), true, &tracker)
            .await
            .unwrap();

        let lines = tracker.lines.lock().unwrap();
        assert_eq!(
            *lines,
            vec![format!(
                "{}/abc.txt -> {} (sha256 ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad)",
                server.uri(),
                dir.path().join("abc.txt").display()
            )]
        );
    }

    #[tokio::test]
    async fn transport_failure_aborts_the_batch() {
        // Nothing listens on port 1, so every request is refused.
        let client = client_for("http://127.0.0.1:1");
        let tracker = RecordingTracker::default();
        let items = (0..3)
            .map(|i| WorkItem::RemoteUrl {
                url: format!("https://example.com/{i}"),
            })
            .collect();
        let err = upload_batch(&client, items, &tracker).await.unwrap_err();
        client.close();

        assert!(err.to_string().contains("Batch aborted"));
        assert!(matches!(
            err.downcast_ref::<ClientError>(),
            Some(ClientError::Transport { .. })
        ));
        assert!(tracker.lines.lock().unwrap().is_empty());
        assert_eq!(tracker.completed.load(Ordering::SeqCst), 1);
        assert_eq!(
            tracker.outcome.lock().unwrap().as_deref(),
            Some("abandoned: Batch aborted.")
        );
    }

    #[tokio::test]
    async fn interrupt_abandons_pending_work() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("late")
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        let tracker = RecordingTracker::default();
        tracker.interrupted.store(true, Ordering::SeqCst);
        let items = vec![WorkItem::RemoteUrl {
            url: "https://example.com/slow".into(),
        }];
        let err = upload_batch(&client, items, &tracker).await.unwrap_err();
        assert_eq!(err.to_string(), "Batch interrupted.");
        assert!(tracker.lines.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_batch_finishes_immediately() {
        let client = client_for("http://127.0.0.1:1");
        let tracker = RecordingTracker::default();
        upload_batch(&client, Vec::new(), &tracker).await.unwrap();
        assert_eq!(tracker.completed.load(Ordering::SeqCst), 0);
        assert_eq!(
            tracker.outcome.lock().unwrap().as_deref(),
            Some("finished: 0 done, 0 failed.")
        );
    }

    #[tokio::test]
    async fn delete_is_one_combined_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/user/api.php"))
            .and(body_string_contains("reqtype=deletefiles"))
            .and(body_string_contains("files=a.txt+b.txt+c.txt"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Files successfully deleted."))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server.uri());
        let items = hosted(&["https://files.catbox.moe/a.txt", "b.txt", "c.txt"]);
        let reply = delete_batch(&client, &items, "secrethash").await.unwrap();
        assert_eq!(reply, "Files successfully deleted.");
    }

    #[tokio::test]
    async fn local_files_cannot_be_downloaded() {
        let client = client_for("http://127.0.0.1:1");
        let tracker = RecordingTracker::default();
        let items = vec![WorkItem::LocalFile {
            path: PathBuf::from("notes.txt"),
            file: tempfile::tempfile().unwrap(),
        }];
        let dir = tempfile::tempdir().unwrap();
        let err = download_batch(&client, items, dir.path(), false, &tracker)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ClientError>(),
            Some(ClientError::WrongItem { .. })
        ));
        assert_eq!(tracker.completed.load(Ordering::SeqCst), 0);
    }
}
