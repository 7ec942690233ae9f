use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, Result};
use chrono::Local;
use clap::{CommandFactory, Parser};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    config::{SettingsStore, TrackerSettings},
    stats::read_snapshot,
    tracker::{
        engine::TimeTracker,
        events::TrackerEvent,
        service::{TrackerHandle, TrackerService},
        session::TrackOutcome,
        shutdown::detect_shutdown,
        task::{InMemoryTaskRegistry, Task},
    },
    utils::{clock::DefaultClock, time::format_minutes},
    watcher::NotifyStorageWatcher,
};

use super::Args;

#[derive(Debug, Parser)]
pub struct TrackCommand {
    #[arg(
        required = true,
        help = "Task line to track. Words starting with + are projects, e.g. \"write report +work\""
    )]
    task: Vec<String>,
}

/// Command to process `track`. Runs the tracker in the foreground until ctrl-c, then prints the
/// time logged against the task today.
pub async fn process_track_command(
    TrackCommand { task }: TrackCommand,
    root: PathBuf,
) -> Result<()> {
    let task = Task::parse(&task.join(" "));
    if task.key.is_empty() {
        return Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                "Task line can't be empty",
            )
            .into());
    }

    let registry = Arc::new(InMemoryTaskRegistry::default());
    registry.insert(task.clone());

    let settings = SettingsStore::new(TrackerSettings {
        root: Some(root.clone()),
    });
    let (tracker, changes) = TimeTracker::new(
        settings.current(),
        registry,
        Box::new(NotifyStorageWatcher),
        DefaultClock::boxed(),
    );
    let shutdown = CancellationToken::new();
    let (service, handle) =
        TrackerService::new(tracker, changes, settings.subscribe(), shutdown.clone());

    let (_, service_result, client_result) = tokio::join!(
        detect_shutdown(shutdown.clone()),
        service.run(),
        track_until_shutdown(handle, task.clone(), shutdown.clone()),
    );

    if let Err(e) = service_result {
        error!("Tracker service got an error {e:?}");
    }
    client_result?;

    let snapshot = read_snapshot(&root, Local::now().date_naive()).await?;
    let minutes = snapshot.minutes(Local::now().date_naive(), &task.key);
    println!("{}\t{}", format_minutes(minutes), task.key);
    Ok(())
}

/// Keeps `task` tracked. Re-initialization stops every tracker, so the task is started again
/// whenever the logs are reloaded.
async fn track_until_shutdown(
    handle: TrackerHandle,
    task: Task,
    shutdown: CancellationToken,
) -> Result<()> {
    let result = async {
        let (_, mut events) = handle.subscribe().await?;
        start(&handle, &task).await?;

        loop {
            select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(TrackerEvent::StorageReloaded) => start(&handle, &task).await?,
                    Some(TrackerEvent::StorageMissing) => warn!("Log directory is missing"),
                    Some(_) => {}
                    None => break,
                },
            }
        }
        Ok(())
    }
    .await;

    shutdown.cancel();
    result
}

async fn start(handle: &TrackerHandle, task: &Task) -> Result<()> {
    match handle.start(task.clone()).await? {
        TrackOutcome::Started | TrackOutcome::AlreadyTracking => {
            info!("Tracking {}", task.key);
            Ok(())
        }
        TrackOutcome::Conflict => Err(anyhow!(
            "{} is already logged as a project and can't be tracked as a task",
            task.key
        )),
        outcome => Err(anyhow!("Couldn't start tracking {}: {outcome:?}", task.key)),
    }
}
