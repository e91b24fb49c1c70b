//! Stdio server for the touchfish daemon.
//!
//! The presentation layer writes one JSON message per line to stdin and reads
//! results, navigation changes and window requests from stdout. Query and
//! status events go through the core session; everything else is handled
//! here against the shared daemon state.

use std::path::PathBuf;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use touchfish_core::config::{Config, Directories};
use touchfish_core::dispatch::{ActionDispatcher, Clipboard, UrlOpener, WindowController};
use touchfish_core::recipe::{RecipeDiff, RecipeRegistry};
use touchfish_core::{ExecutionEngine, ExecutionOutput, NavigationStack, Session, SessionEvent};
use tracing::{debug, error, info, trace, warn};

use crate::codec::{InboundCodec, InboundLine};
use crate::error::{DaemonError, Result};
use crate::protocol::{Inbound, Outbound};
use crate::system::{CommandClipboard, CommandUrlOpener, ProtocolWindow};
use crate::watcher::{ReloadReason, ReloadWatcher};

/// Longest accepted inbound line
const MAX_LINE_LENGTH: usize = 64 * 1024;

/// Clipboard and URL opener used by `copy` and `open` actions
pub struct Collaborators {
    pub clipboard: Arc<dyn Clipboard>,
    pub opener: Arc<dyn UrlOpener>,
}

impl Collaborators {
    #[must_use]
    pub fn system() -> Self {
        Self {
            clipboard: Arc::new(CommandClipboard::detect()),
            opener: Arc::new(CommandUrlOpener),
        }
    }
}

pub struct Daemon {
    dirs: Directories,
    config: RwLock<Config>,
    registry: Arc<RecipeRegistry>,
    navigation: Arc<NavigationStack>,
    engine: Arc<ExecutionEngine>,
    dispatcher: Arc<ActionDispatcher>,
    window: Arc<dyn WindowController>,
    last_result: Mutex<Option<ExecutionOutput>>,
    outbound: mpsc::UnboundedSender<Outbound>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Outbound>>>,
}

impl Daemon {
    /// Load config and recipes from `dirs` and wire up the engine.
    #[must_use]
    pub fn new(dirs: Directories, collaborators: Collaborators) -> Self {
        let config = Config::load_or_default(&dirs.config_file);
        let registry = Arc::new(RecipeRegistry::load(&config.recipe_search_path(&dirs)));
        let navigation = Arc::new(NavigationStack::new(Arc::clone(&registry)));
        let engine = Arc::new(ExecutionEngine::new(
            Arc::clone(&registry),
            config.execution.clone(),
        ));

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let window: Arc<dyn WindowController> = Arc::new(ProtocolWindow::new(outbound.clone()));
        let dispatcher = Arc::new(
            ActionDispatcher::new(
                Arc::clone(&navigation),
                Arc::clone(&window),
                collaborators.clipboard,
                collaborators.opener,
            )
            .with_browser(config.actions.browser.clone()),
        );

        Self {
            dirs,
            config: RwLock::new(config),
            registry,
            navigation,
            engine,
            dispatcher,
            window,
            last_result: Mutex::new(None),
            outbound,
            outbound_rx: Mutex::new(Some(outbound_rx)),
        }
    }

    #[must_use]
    pub fn navigation(&self) -> &Arc<NavigationStack> {
        &self.navigation
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<RecipeRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn config(&self) -> Config {
        self.config.read().clone()
    }

    fn recipe_dirs(&self) -> Vec<PathBuf> {
        self.config.read().recipe_search_path(&self.dirs)
    }

    /// Re-read the config, rescan recipes, and drop a vanished active recipe.
    pub fn reload(&self) -> RecipeDiff {
        let config = Config::load_or_default(&self.dirs.config_file);
        self.engine.set_config(config.execution.clone());
        self.dispatcher.set_browser(config.actions.browser.clone());
        *self.config.write() = config;

        let diff = self.registry.rescan(&self.recipe_dirs());
        if self.navigation.reconcile() {
            info!("Active recipe was removed, returned to recipe list");
        }
        self.send(Outbound::Recipes {
            recipes: self.navigation.recipes(),
        });
        diff
    }

    fn send(&self, message: Outbound) {
        if self.outbound.send(message).is_err() {
            debug!("Outbound channel closed");
        }
    }

    /// Serve one client until its input ends.
    ///
    /// # Errors
    ///
    /// Returns an error if called twice or if the output cannot be written.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let outbound_rx = self
            .outbound_rx
            .lock()
            .take()
            .ok_or(DaemonError::AlreadyServing)?;

        let shutdown = CancellationToken::new();
        let writer_task = tokio::spawn(write_messages(writer, outbound_rx, shutdown.clone()));

        let (session, mut results) = Session::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.navigation),
            Arc::clone(&self.window),
        );
        let (events, events_rx) = mpsc::unbounded_channel();
        let session_task = tokio::spawn(session.run(events_rx));

        let daemon = Arc::clone(&self);
        let results_task = tokio::spawn(async move {
            while let Some(output) = results.recv().await {
                *daemon.last_result.lock() = Some(output.clone());
                daemon.send(Outbound::Result(output));
            }
        });

        let daemon = Arc::clone(&self);
        let mut transitions = self.navigation.subscribe();
        let navigation_task = tokio::spawn(async move {
            while transitions.changed().await.is_ok() {
                let active = transitions.borrow_and_update().active_recipe().map(str::to_string);
                daemon.send(Outbound::Navigation { active });
            }
        });

        self.send(Outbound::Recipes {
            recipes: self.navigation.recipes(),
        });
        self.send(Outbound::Navigation {
            active: self.navigation.active_recipe(),
        });

        let mut lines = FramedRead::new(reader, InboundCodec::new(MAX_LINE_LENGTH));
        while let Some(line) = lines.next().await {
            match line {
                Ok(InboundLine::Text(line)) if line.trim().is_empty() => {}
                Ok(InboundLine::Text(line)) => {
                    trace!("<- {}", line);
                    match serde_json::from_str::<Inbound>(&line) {
                        Ok(message) => self.handle(message, &events).await,
                        Err(e) => {
                            warn!("Ignoring malformed message: {}", e);
                            self.send(Outbound::Error {
                                message: format!("invalid message: {e}"),
                            });
                        }
                    }
                }
                Ok(InboundLine::Rejected(reason)) => {
                    warn!("Dropped inbound line: {}", reason);
                    self.send(Outbound::Error { message: reason });
                }
                Err(e) => {
                    error!("Read error: {}", e);
                    break;
                }
            }
        }

        debug!("Input closed, shutting down");
        drop(events);
        if let Err(e) = session_task.await {
            error!("Session task failed: {}", e);
        }
        // The session dropped its sender, so this ends once the queue is drained
        let _ = results_task.await;
        navigation_task.abort();

        shutdown.cancel();
        match writer_task.await {
            Ok(result) => result,
            Err(e) => {
                error!("Writer task failed: {}", e);
                Ok(())
            }
        }
    }

    async fn handle(&self, message: Inbound, events: &mpsc::UnboundedSender<SessionEvent>) {
        if let Some(event) = message.session_event() {
            if events.send(event).is_err() {
                warn!("Session stopped, dropping event");
            }
            return;
        }

        match message {
            Inbound::GoToRecipe { id } => {
                if let Err(e) = self.navigation.go_to_recipe(id.as_deref()) {
                    warn!("Navigation failed: {}", e);
                    self.send(Outbound::Error {
                        message: e.to_string(),
                    });
                }
            }
            Inbound::ItemTapped { index } => self.tap(index).await,
            Inbound::Reload => {
                let diff = self.reload();
                debug!("Reload requested by client: {:?}", diff);
            }
            Inbound::QueryChanged { .. } | Inbound::StatusChanged => {}
        }
    }

    async fn tap(&self, index: usize) {
        let active = self.navigation.active_recipe();
        let item = self.last_result.lock().as_ref().and_then(|output| {
            if active.as_deref() != Some(output.recipe_id.as_str()) {
                return None;
            }
            output
                .result
                .visible_items()
                .get(index)
                .cloned()
                .map(|item| (output.recipe_id.clone(), item))
        });

        let Some((recipe_id, item)) = item else {
            warn!("Tap on item {} with no such item in the current result", index);
            self.send(Outbound::Error {
                message: format!("no item at index {index}"),
            });
            return;
        };

        // Collaborators run platform commands
        let dispatcher = Arc::clone(&self.dispatcher);
        let report =
            tokio::task::spawn_blocking(move || dispatcher.dispatch(&item, &recipe_id)).await;
        match report {
            Ok(report) if !report.is_clean() => {
                debug!("{} action(s) failed", report.failures.len());
            }
            Ok(_) => {}
            Err(e) => error!("Action dispatch panicked: {}", e),
        }
    }
}

async fn write_messages<W>(
    writer: W,
    mut messages: mpsc::UnboundedReceiver<Outbound>,
    shutdown: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut sink = FramedWrite::new(writer, LinesCodec::new());

    loop {
        let message = tokio::select! {
            message = messages.recv() => message,
            () = shutdown.cancelled() => None,
        };
        let Some(message) = message else {
            break;
        };
        write_message(&mut sink, &message).await?;
    }

    while let Ok(message) = messages.try_recv() {
        write_message(&mut sink, &message).await?;
    }
    Ok(())
}

async fn write_message<W>(sink: &mut FramedWrite<W, LinesCodec>, message: &Outbound) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = serde_json::to_string(message)?;
    trace!("-> {}", line);
    sink.send(line).await?;
    Ok(())
}

/// Run the daemon on stdin/stdout.
///
/// # Errors
///
/// Returns an error if the directories cannot be created or stdout fails.
pub async fn run(dirs: Directories, watch: bool, activate: Option<String>) -> Result<()> {
    dirs.ensure_exists()?;
    let daemon = Arc::new(Daemon::new(dirs, Collaborators::system()));
    info!(
        "Loaded {} recipes from {:?}",
        daemon.registry().snapshot().len(),
        daemon.recipe_dirs()
    );

    let _watcher = watch.then(|| {
        let (reload_tx, mut reload_rx) = mpsc::unbounded_channel::<ReloadReason>();
        let watcher = ReloadWatcher::spawn(
            daemon.dirs.config_file.clone(),
            daemon.recipe_dirs(),
            reload_tx,
        );

        let daemon = Arc::clone(&daemon);
        tokio::spawn(async move {
            while let Some(reason) = reload_rx.recv().await {
                info!("{:?} changed, reloading", reason);
                let daemon = Arc::clone(&daemon);
                match tokio::task::spawn_blocking(move || daemon.reload()).await {
                    Ok(diff) if !diff.is_empty() => debug!("Reload diff: {:?}", diff),
                    Ok(_) => {}
                    Err(e) => error!("Reload failed: {}", e),
                }
            }
        });
        watcher
    });

    if let Some(id) = activate {
        daemon.navigation().go_to_recipe(Some(&id))?;
    }

    info!("Ready on stdio");
    daemon.serve(tokio::io::stdin(), tokio::io::stdout()).await?;
    info!("TouchFish daemon stopped");
    Ok(())
}
