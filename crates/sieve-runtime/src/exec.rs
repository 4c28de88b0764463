//! FilterExecutor - user hooks on a dedicated thread
//!
//! The supervisor must be able to keep its deadlines against user code
//! that blocks, so `setup` / `process` / `shutdown` run on their own OS
//! thread, one command at a time. The supervisor awaits replies with
//! whatever timeout the lifecycle calls for; a call that never returns
//! strands only the detached thread, never the supervisor.

use std::sync::mpsc as std_mpsc;
use std::thread;

use sieve_protocol::Frame;
use sieve_routing::Tick;
use tokio::sync::oneshot;
use tracing::{debug, Span};

use crate::error::LifecycleError;
use crate::filter::{Filter, FilterContext};

enum Command {
    Setup(oneshot::Sender<anyhow::Result<()>>),
    Process(Tick, oneshot::Sender<anyhow::Result<Vec<Frame>>>),
    Shutdown(bool, oneshot::Sender<anyhow::Result<()>>),
}

/// Serialized access to one filter's hooks
pub struct FilterExecutor {
    commands: std_mpsc::Sender<Command>,
}

impl FilterExecutor {
    /// Move the filter and its context onto a fresh executor thread
    ///
    /// The caller's current span is entered on the thread, so logs from
    /// user hooks keep their `filter_id` / `run_id` attribution.
    pub fn spawn(mut filter: Box<dyn Filter>, mut ctx: FilterContext) -> Self {
        let (command_tx, command_rx) = std_mpsc::channel::<Command>();
        let thread_name = format!("filter-{}", ctx.id);
        let span = Span::current();

        let builder = thread::Builder::new().name(thread_name);
        let _ = builder.spawn(move || {
            let _span = span.entered();
            // One command at a time: process never overlaps itself.
            while let Ok(command) = command_rx.recv() {
                match command {
                    Command::Setup(reply) => {
                        let _ = reply.send(filter.setup(&mut ctx));
                    }
                    Command::Process(tick, reply) => {
                        let _ = reply.send(filter.process(&mut ctx, &tick));
                    }
                    Command::Shutdown(was_killed, reply) => {
                        let _ = reply.send(filter.shutdown(&mut ctx, was_killed));
                        break;
                    }
                }
            }
            debug!("executor thread exiting");
        });

        Self {
            commands: command_tx,
        }
    }

    /// Run `user_setup`
    pub async fn setup(&self) -> Result<anyhow::Result<()>, LifecycleError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Setup(reply_tx))
            .map_err(|_| LifecycleError::ExecutorGone)?;
        reply_rx.await.map_err(|_| LifecycleError::ExecutorGone)
    }

    /// Run `user_process` on one tick
    pub async fn process(&self, tick: Tick) -> Result<anyhow::Result<Vec<Frame>>, LifecycleError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Process(tick, reply_tx))
            .map_err(|_| LifecycleError::ExecutorGone)?;
        reply_rx.await.map_err(|_| LifecycleError::ExecutorGone)
    }

    /// Run `user_shutdown`; the executor thread exits afterwards
    ///
    /// If a stuck `process` is still running, the shutdown command queues
    /// behind it and executes when (if) it returns; the caller should
    /// bound its wait accordingly.
    pub async fn shutdown(&self, was_killed: bool) -> Result<anyhow::Result<()>, LifecycleError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Shutdown(was_killed, reply_tx))
            .map_err(|_| LifecycleError::ExecutorGone)?;
        reply_rx.await.map_err(|_| LifecycleError::ExecutorGone)
    }
}
