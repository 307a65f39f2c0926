use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use pilot_protocol::RaceMessage;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::coordinator::CoordinatorMessage;

const REPLAY_TICK: Duration = Duration::from_millis(1);

/// Append-only journal of one race, one JSON object per line. A journal file
/// is opened lazily on the first recorded message and closed on race stop.
pub struct RaceJournal {
    dir: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl RaceJournal {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            writer: None,
        }
    }

    pub fn record(&mut self, message: &RaceMessage) -> io::Result<()> {
        if self.writer.is_none() {
            self.open()?;
        }
        if let Some(writer) = self.writer.as_mut() {
            serde_json::to_writer(&mut *writer, message)
                .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;
            writer.write_all(b"\n")?;
        }
        if matches!(message, RaceMessage::RaceStop) {
            self.close();
        }
        Ok(())
    }

    pub fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(error) = writer.flush() {
                warn!(%error, "failed to flush race journal");
            }
        }
    }

    fn open(&mut self) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let name = format!("race-{}.jsonl", Utc::now().format("%Y%m%d-%H%M%S"));
        let path = self.dir.join(name);
        info!(path = %path.display(), "recording race journal");
        self.writer = Some(BufWriter::new(File::create(path)?));
        Ok(())
    }
}

/// Spawns the recording process; the coordinator sends it a copy of every
/// race message it sees.
pub fn spawn(dir: PathBuf) -> mpsc::Sender<RaceMessage> {
    let (tx, mut rx) = mpsc::channel(1024);
    tokio::spawn(async move {
        let mut journal = RaceJournal::new(dir);
        while let Some(message) = rx.recv().await {
            if let Err(error) = journal.record(&message) {
                warn!(%error, "failed to journal race message");
            }
        }
        journal.close();
    });
    tx
}

/// One step of a journal replay. The end of the stream is a value, not an
/// error: replay simply runs dry.
#[derive(Debug)]
pub enum PlaybackStep {
    Event(RaceMessage),
    Exhausted,
}

pub struct Playback {
    lines: Lines<BufReader<File>>,
}

impl Playback {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            lines: BufReader::new(file).lines(),
        })
    }

    /// Next replayable event. Journaled outbound power records are skipped:
    /// they document what the pilot did, the replayed pilot decides anew.
    pub fn next_step(&mut self) -> PlaybackStep {
        for line in &mut self.lines {
            let Ok(line) = line else {
                return PlaybackStep::Exhausted;
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RaceMessage>(&line) {
                Ok(RaceMessage::Power(_)) => continue,
                Ok(event) => return PlaybackStep::Event(event),
                Err(error) => {
                    warn!(%error, "skipping malformed journal line");
                }
            }
        }
        PlaybackStep::Exhausted
    }
}

/// Pumps a recorded race into the coordinator on a fixed tick. Sending on
/// the returned channel cancels the replay; once the cancellation is
/// processed no further event is delivered.
pub fn spawn_replay(
    mut playback: Playback,
    coordinator: mpsc::Sender<CoordinatorMessage>,
) -> (JoinHandle<()>, mpsc::Sender<()>) {
    let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
    let handle = tokio::spawn(async move {
        let mut tick = tokio::time::interval(REPLAY_TICK);
        loop {
            tokio::select! {
                biased;
                _ = stop_rx.recv() => {
                    info!("replay cancelled");
                    break;
                }
                _ = tick.tick() => match playback.next_step() {
                    PlaybackStep::Event(event) => {
                        if coordinator
                            .send(CoordinatorMessage::Relay(event))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                    PlaybackStep::Exhausted => {
                        info!("replay exhausted");
                        break;
                    }
                },
            }
        }
    });
    (handle, stop_tx)
}
