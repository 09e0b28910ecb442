//! Pipeline stage trait
//!
//! Every long-running loop of a session (encode, transmit, reliable receive,
//! lossy receive) is a stage. Coordinators own the stages, wire their
//! channels and spawn `run()` on the runtime.

use anyhow::Result;
use async_trait::async_trait;
use log::{error, info};
use tokio::task::JoinHandle;

use crate::error::PipelineError;

#[async_trait]
pub trait PipelineStage: Send {
    /// Process data until the input ends or the stage is cancelled
    async fn run(&mut self) -> Result<()>;

    /// Name used in log lines
    fn name(&self) -> &'static str;

    /// Release resources held by the stage
    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Spawn a stage on the runtime, logging how it ended
pub fn spawn_stage<S>(mut stage: S) -> JoinHandle<()>
where
    S: PipelineStage + 'static,
{
    tokio::spawn(async move {
        let name = stage.name();
        match stage.run().await {
            Ok(()) => info!("{}: ended", name),
            Err(e) => match e.downcast_ref::<PipelineError>() {
                Some(pe) if pe.is_terminal() => info!("{}: ended, {}", name, pe),
                _ => error!("{} error: {}", name, e),
            },
        }
        if let Err(e) = stage.shutdown().await {
            error!("{} shutdown error: {}", name, e);
        }
    })
}
