//! Room actor: the single task that owns and mutates the room
//!
//! Connection handlers, the tick schedule and the sweep schedule all talk to
//! it through a [`RoomHandle`].

use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::util::time::{tick_duration, unix_millis};
use crate::ws::protocol::{ClientMsg, Outbound};

use super::player::ConnId;
use super::room::{Room, RoomStats};

/// Commands queued for the room actor
#[derive(Debug)]
pub enum RoomCommand {
    /// A new connection with its outbound channel
    Attach {
        conn_id: ConnId,
        tx: mpsc::Sender<Outbound>,
    },
    /// The connection is gone
    Detach { conn_id: ConnId },
    /// A decoded control message
    Client { conn_id: ConnId, msg: ClientMsg },
    /// Advance the simulation one step
    Tick,
    /// Evict idle players
    Sweep,
    /// Snapshot figures for health reporting
    Stats { reply: oneshot::Sender<RoomStats> },
}

/// Cloneable handle to the room actor
#[derive(Clone, Debug)]
pub struct RoomHandle {
    tx: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    /// Queue a command, waiting for space. Returns false once the room is gone.
    pub async fn send(&self, cmd: RoomCommand) -> bool {
        self.tx.send(cmd).await.is_ok()
    }

    pub async fn attach(&self, conn_id: ConnId, tx: mpsc::Sender<Outbound>) -> bool {
        self.send(RoomCommand::Attach { conn_id, tx }).await
    }

    pub async fn detach(&self, conn_id: ConnId) {
        let _ = self.send(RoomCommand::Detach { conn_id }).await;
    }

    pub async fn submit(&self, conn_id: ConnId, msg: ClientMsg) -> bool {
        self.send(RoomCommand::Client { conn_id, msg }).await
    }

    pub async fn stats(&self) -> Option<RoomStats> {
        let (reply, rx) = oneshot::channel();
        if !self.send(RoomCommand::Stats { reply }).await {
            return None;
        }
        rx.await.ok()
    }
}

/// Owns the room and applies commands in arrival order
pub struct RoomService {
    room: Room,
    rx: mpsc::Receiver<RoomCommand>,
}

impl RoomService {
    pub fn new(room: Room) -> (Self, RoomHandle) {
        let (tx, rx) = mpsc::channel(1024);
        (Self { room, rx }, RoomHandle { tx })
    }

    /// Run until every handle has been dropped
    pub async fn run(mut self) {
        info!(
            room_id = %self.room.id(),
            world_seed = self.room.world_seed(),
            "Room started"
        );

        while let Some(cmd) = self.rx.recv().await {
            let now = unix_millis();
            match cmd {
                RoomCommand::Attach { conn_id, tx } => self.room.attach(conn_id, tx),
                RoomCommand::Detach { conn_id } => self.room.detach(conn_id),
                RoomCommand::Client { conn_id, msg } => self.room.handle_message(conn_id, msg, now),
                RoomCommand::Tick => self.room.tick(now),
                RoomCommand::Sweep => {
                    let evicted = self.room.sweep_idle(now);
                    if evicted > 0 {
                        info!(evicted, "Evicted idle players");
                    }
                }
                RoomCommand::Stats { reply } => {
                    let _ = reply.send(self.room.stats());
                }
            }
        }

        info!(room_id = %self.room.id(), "Room stopped");
    }
}

/// The recurring jobs driving a room. Each can be stopped on its own.
pub struct Schedules {
    pub ticker: JoinHandle<()>,
    pub sweeper: JoinHandle<()>,
}

impl Schedules {
    pub fn start(handle: &RoomHandle, sweep_interval: Duration) -> Self {
        Self {
            ticker: spawn_recurring(handle.clone(), tick_duration(), || RoomCommand::Tick),
            sweeper: spawn_recurring(handle.clone(), sweep_interval, || RoomCommand::Sweep),
        }
    }

    pub fn shutdown(self) {
        self.ticker.abort();
        self.sweeper.abort();
    }
}

/// Send a command every `period`. Late ticks are skipped, never bunched.
fn spawn_recurring<F>(handle: RoomHandle, period: Duration, make: F) -> JoinHandle<()>
where
    F: Fn() -> RoomCommand + Send + 'static,
{
    tokio::spawn(async move {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            timer.tick().await;
            if !handle.send(make()).await {
                debug!("Room closed, stopping schedule");
                break;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::room::RoomSettings;
    use crate::game::snapshot::{decode_frame, InterestPolicy};
    use crate::ws::leaderboard::LeaderboardHub;
    use uuid::Uuid;

    fn start() -> RoomHandle {
        let room = Room::new(
            RoomSettings {
                world_seed: 9,
                idle_timeout_ms: 30_000,
                interest: InterestPolicy::default(),
            },
            LeaderboardHub::new(),
        );
        let (service, handle) = RoomService::new(room);
        tokio::spawn(service.run());
        handle
    }

    #[tokio::test]
    async fn stats_reflect_attached_connections() {
        let handle = start();
        let (tx, _rx) = mpsc::channel(8);
        let conn_id = Uuid::new_v4();
        assert!(handle.attach(conn_id, tx).await);

        let stats = handle.stats().await.unwrap();
        assert_eq!(stats.connections, 1);
        assert_eq!(stats.players, 0);
        assert_eq!(stats.world_seed, 9);

        handle.detach(conn_id).await;
        assert_eq!(handle.stats().await.unwrap().connections, 0);
    }

    #[tokio::test]
    async fn ticker_streams_frames() {
        let handle = start();
        let (tx, mut rx) = mpsc::channel(64);
        let conn_id = Uuid::new_v4();
        handle.attach(conn_id, tx).await;
        handle
            .submit(conn_id, ClientMsg::Hello { name: "Ace".into() })
            .await;

        let schedules = Schedules::start(&handle, Duration::from_secs(60));
        let mut frames = 0;
        while frames < 3 {
            match rx.recv().await.unwrap() {
                Outbound::Binary(frame) => {
                    assert_eq!(decode_frame(&frame).unwrap().len(), 1);
                    frames += 1;
                }
                _ => continue,
            }
        }
        schedules.shutdown();
        assert!(handle.stats().await.unwrap().tick >= 3);
    }
}
