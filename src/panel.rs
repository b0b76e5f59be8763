//! Controlador del panel de chat.
//!
//! Un único actor por panel procesa, de uno en uno, los mensajes de la vista
//! y las órdenes del anfitrión (proyecto analizado, reinicio). Una segunda
//! pregunta que llega mientras la primera espera respuesta queda en la cola.

use std::sync::Arc;

use anyhow::{anyhow, Result};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::assembler;
use crate::client::{prime_project, ChatBackend};
use crate::config::{AppConfig, ContextMode, ProjectDelivery, RelatedFilesSource};
use crate::formatter;
use crate::history::ConversationStore;
use crate::host::{DocumentSource, WorkspaceRoot};
use crate::models::{ChatTurn, ProjectContext, ProjectSnapshot, Sender};
use crate::protocol::{InboundMessage, OutboundMessage, Outbox};
use crate::scanner::{ExclusionSet, Scanner};

#[derive(Debug, Clone)]
pub struct PanelSettings {
    pub context_mode: ContextMode,
    pub project_delivery: ProjectDelivery,
    pub priming_batch_size: usize,
    pub related_files: RelatedFilesSource,
    pub exclusions: ExclusionSet,
}

impl PanelSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            context_mode: cfg.context_mode,
            project_delivery: cfg.project_delivery,
            priming_batch_size: cfg.priming_batch_size,
            related_files: cfg.related_files,
            exclusions: cfg.exclusions.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    Uninitialized,
    Ready,
}

pub struct PanelController {
    state: PanelState,
    settings: PanelSettings,
    scanner: Scanner,
    store: ConversationStore,
    backend: Arc<dyn ChatBackend>,
    documents: Arc<dyn DocumentSource>,
    workspace: Arc<dyn WorkspaceRoot>,
    project: Option<ProjectContext>,
    outbox: Outbox,
}

impl PanelController {
    pub fn new(
        settings: PanelSettings,
        store: ConversationStore,
        backend: Arc<dyn ChatBackend>,
        documents: Arc<dyn DocumentSource>,
        workspace: Arc<dyn WorkspaceRoot>,
    ) -> Self {
        Self {
            state: PanelState::Uninitialized,
            scanner: Scanner::new(settings.exclusions.clone()),
            settings,
            store,
            backend,
            documents,
            workspace,
            project: None,
            outbox: Outbox::default(),
        }
    }

    pub fn state(&self) -> PanelState {
        self.state
    }

    pub fn outbox(&self) -> Outbox {
        self.outbox.clone()
    }

    pub fn history(&self) -> Vec<ChatTurn> {
        self.store.replay()
    }

    pub async fn handle(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::UserInput { value } => self.on_user_input(value).await,
            InboundMessage::ViewReady | InboundMessage::GetHistory => {
                self.state = PanelState::Ready;
                self.outbox.push(OutboundMessage::LoadHistory { history: self.store.replay() });
            }
            InboundMessage::Unknown => debug!("Mensaje de la vista ignorado."),
        }
    }

    async fn on_user_input(&mut self, text: String) {
        if self.state == PanelState::Uninitialized {
            debug!("Pregunta recibida antes de que la vista esté lista.");
        }

        self.outbox.push(OutboundMessage::AddMessage { value: text.clone(), sender: Sender::User });
        self.store.push(ChatTurn::user(text.clone()));
        self.outbox.push(OutboundMessage::SetLoading { value: true });

        let context = self.build_context(&text).await;
        let reply = self.backend.send(&text, &context).await;
        let formatted = formatter::format(&reply);

        self.store.push(ChatTurn::bot(formatted.clone()));
        self.outbox.push(OutboundMessage::AddMessage { value: formatted, sender: Sender::Bot });
        self.outbox.push(OutboundMessage::SetLoading { value: false });
    }

    /// Sustituye el proyecto analizado. En entrega por lotes, envía aquí los
    /// lotes al servicio antes de atender nuevas preguntas.
    pub async fn project_analyzed(&mut self, project: ProjectContext) {
        if self.settings.context_mode == ContextMode::FullProject
            && self.settings.project_delivery == ProjectDelivery::Batched
        {
            let batches =
                assembler::project_batches(&project.snapshot, self.settings.priming_batch_size);
            let calls = prime_project(self.backend.as_ref(), &batches).await;
            info!("Proyecto enviado en {} lotes.", calls);
        }
        self.project = Some(project);
        self.outbox.push(OutboundMessage::ProjectAnalyzed);
    }

    /// Reinicia la conversación en el servidor y, si lo consigue, también la
    /// local. Si el servidor falla, el historial local se conserva.
    pub async fn reset(&mut self) -> Result<String> {
        let message = self.backend.reset().await?;
        self.store.clear();
        self.outbox.push(OutboundMessage::LoadHistory { history: Vec::new() });
        info!("Conversación reiniciada: {}", message);
        Ok(message)
    }

    async fn build_context(&self, text: &str) -> String {
        match self.settings.context_mode {
            ContextMode::FullProject => match (&self.project, self.settings.project_delivery) {
                (Some(project), ProjectDelivery::Single) => project.blob.clone(),
                _ => String::new(),
            },
            ContextMode::Keyword => self
                .project
                .as_ref()
                .map(|p| assembler::keyword_context(&p.blob, text))
                .unwrap_or_default(),
            ContextMode::ActiveDocument => self.active_document_context().await,
        }
    }

    async fn active_document_context(&self) -> String {
        let Some(doc) = self.documents.active_document() else {
            return String::new();
        };
        let base = assembler::document_record(&doc);

        let names =
            assembler::related_file_names(self.backend.as_ref(), self.settings.related_files, &doc)
                .await;
        if names.is_empty() {
            return base;
        }
        let Some(snapshot) = self.project_snapshot().await else {
            return base;
        };
        let files = assembler::resolve_related(&names, &snapshot);
        assembler::append_related(&base, &snapshot.root, &files)
    }

    /// Snapshot del último análisis o, si no lo hay, un escaneo nuevo de la
    /// carpeta de trabajo.
    async fn project_snapshot(&self) -> Option<ProjectSnapshot> {
        if let Some(project) = &self.project {
            return Some(project.snapshot.clone());
        }
        let root = self.workspace.workspace_root()?;
        let scanner = self.scanner.clone();
        match tokio::task::spawn_blocking(move || scanner.scan(&root)).await {
            Ok(Ok(snapshot)) => Some(snapshot),
            Ok(Err(e)) => {
                warn!("No se pudo escanear el proyecto: {e:#}");
                None
            }
            Err(e) => {
                error!("La tarea de escaneo terminó de forma inesperada: {e}");
                None
            }
        }
    }
}

pub enum PanelCommand {
    Ui(InboundMessage),
    ProjectAnalyzed(ProjectContext),
    Reset(oneshot::Sender<Result<String>>),
}

/// Acceso al actor del panel desde el resto de la aplicación.
#[derive(Clone)]
pub struct PanelHandle {
    tx: mpsc::UnboundedSender<PanelCommand>,
    outbox: Outbox,
}

impl PanelHandle {
    pub fn spawn(mut controller: PanelController) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outbox = controller.outbox();

        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    PanelCommand::Ui(message) => controller.handle(message).await,
                    PanelCommand::ProjectAnalyzed(project) => {
                        controller.project_analyzed(project).await
                    }
                    PanelCommand::Reset(reply) => {
                        let _ = reply.send(controller.reset().await);
                    }
                }
            }
            debug!("Actor del panel finalizado.");
        });

        Self { tx, outbox }
    }

    pub fn send_ui(&self, message: InboundMessage) -> Result<()> {
        self.command(PanelCommand::Ui(message))
    }

    pub fn project_analyzed(&self, project: ProjectContext) -> Result<()> {
        self.command(PanelCommand::ProjectAnalyzed(project))
    }

    pub async fn reset(&self) -> Result<String> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command(PanelCommand::Reset(reply_tx))?;
        reply_rx.await.map_err(|_| anyhow!("El panel no respondió al reinicio"))?
    }

    pub fn drain_events(&self) -> Vec<OutboundMessage> {
        self.outbox.drain()
    }

    fn command(&self, command: PanelCommand) -> Result<()> {
        self.tx.send(command).map_err(|_| anyhow!("El panel ya no está activo"))
    }
}
