//! Control handle for a running chart service.
//!
//! Callers hold a cheap clonable [`ChartConsole`] and talk to the
//! service task over a command channel; every command carries a oneshot
//! reply so the caller learns whether it was applied.

use tokio::sync::{mpsc, oneshot};

use super::axis::AxisGroup;
use crate::error::{Error, Result};

const COMMAND_QUEUE: usize = 16;

#[derive(Debug)]
pub enum ChartCommand {
    /// Pause or resume chart updates without dropping what is plotted.
    SetEnabled {
        enabled: bool,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Wipe the plotted series and the persisted copy.
    ClearHistory {
        reply: oneshot::Sender<Result<()>>,
    },
    SetAxisPadding {
        group: AxisGroup,
        padding: f64,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Persist now instead of waiting for the next interval tick.
    FlushTick {
        reply: oneshot::Sender<Result<()>>,
    },
}

#[derive(Clone)]
pub struct ChartConsole {
    tx: mpsc::Sender<ChartCommand>,
}

impl ChartConsole {
    pub(crate) fn channel() -> (Self, mpsc::Receiver<ChartCommand>) {
        let (tx, rx) = mpsc::channel(COMMAND_QUEUE);
        (Self { tx }, rx)
    }

    pub async fn set_enabled(&self, enabled: bool) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ChartCommand::SetEnabled { enabled, reply })
            .await
            .map_err(|_| service_gone())?;
        rx.await.map_err(|_| service_gone())?
    }

    pub async fn clear_history(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ChartCommand::ClearHistory { reply })
            .await
            .map_err(|_| service_gone())?;
        rx.await.map_err(|_| service_gone())?
    }

    pub async fn set_axis_padding(&self, group: AxisGroup, padding: f64) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ChartCommand::SetAxisPadding {
                group,
                padding,
                reply,
            })
            .await
            .map_err(|_| service_gone())?;
        rx.await.map_err(|_| service_gone())?
    }

    pub async fn flush(&self) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ChartCommand::FlushTick { reply })
            .await
            .map_err(|_| service_gone())?;
        rx.await.map_err(|_| service_gone())?
    }
}

fn service_gone() -> Error {
    Error::Other("chart service stopped".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn commands_round_trip_through_the_channel() {
        let (console, mut rx) = ChartConsole::channel();

        let server = tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    ChartCommand::SetEnabled { enabled, reply } => {
                        assert!(enabled);
                        let _ = reply.send(Ok(()));
                    }
                    ChartCommand::ClearHistory { reply } => {
                        let _ = reply.send(Ok(()));
                    }
                    ChartCommand::SetAxisPadding { group, padding, reply } => {
                        assert_eq!(group, AxisGroup::Temperature);
                        assert_eq!(padding, 0.2);
                        let _ = reply.send(Ok(()));
                    }
                    ChartCommand::FlushTick { reply } => {
                        let _ = reply.send(Ok(()));
                    }
                }
            }
        });

        console.set_enabled(true).await.unwrap();
        console.clear_history().await.unwrap();
        console
            .set_axis_padding(AxisGroup::Temperature, 0.2)
            .await
            .unwrap();
        console.flush().await.unwrap();

        drop(console);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn dropped_service_surfaces_an_error() {
        let (console, rx) = ChartConsole::channel();
        drop(rx);
        let err = console.clear_history().await.unwrap_err();
        assert!(err.to_string().contains("stopped"));
    }

    #[tokio::test]
    async fn dropped_reply_surfaces_an_error() {
        let (console, mut rx) = ChartConsole::channel();
        tokio::spawn(async move {
            // Service takes the command but never answers.
            let _ = rx.recv().await;
        });
        let err = console.flush().await.unwrap_err();
        assert!(err.to_string().contains("stopped"));
    }
}
