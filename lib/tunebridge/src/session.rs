use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use shared::{
    catalog::{Identity, PlaylistRef, PlaylistSelector, Track, WriteMode},
    conversion::{AmbiguityPolicy, ConversionEvent, ConversionSummary},
};
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::catalog::{self, prime_playlists};
use crate::config::ConverterConfig;
use crate::converter::{ConversionJob, Converter};
use crate::error::{ConvertError, Result};
use crate::resolution::{resolution_channel, Decision, ResolutionHandle};
use crate::traits::{AuthClient, CatalogClient};

/// Credentials and clients for one side of a conversion.
pub struct CatalogAccount {
    pub auth: Arc<dyn AuthClient>,
    pub catalog: Arc<dyn CatalogClient>,
    pub credential: String,
}

#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub playlist_id: String,
    pub destination: PlaylistSelector,
    pub mode: WriteMode,
    pub ambiguity: AmbiguityPolicy,
}

struct ActiveConversion {
    resolver: ResolutionHandle,
    cancel: CancellationToken,
}

/// Clears the active conversion even if the converting future is dropped.
struct ActiveGuard<'a>(&'a Session);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.active().take();
        self.0.touch();
    }
}

/// A logged-in pair of catalog accounts and the conversion they run.
pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    source_identity: Identity,
    destination_identity: Identity,
    source: Arc<dyn CatalogClient>,
    destination: Arc<dyn CatalogClient>,
    playlists: RwLock<Vec<PlaylistRef>>,
    events: broadcast::Sender<ConversionEvent>,
    active: Mutex<Option<ActiveConversion>>,
    cancellation_token: CancellationToken,
    last_activity: Mutex<Instant>,
    config: ConverterConfig,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn source_identity(&self) -> &Identity {
        &self.source_identity
    }

    pub fn destination_identity(&self) -> &Identity {
        &self.destination_identity
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversionEvent> {
        self.touch();
        self.events.subscribe()
    }

    fn active(&self) -> MutexGuard<'_, Option<ActiveConversion>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn touch(&self) {
        *self.last_activity.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }

    pub fn is_converting(&self) -> bool {
        self.active().is_some()
    }

    fn is_stale(&self, threshold: Duration) -> bool {
        !self.is_converting() && self.events.receiver_count() == 0 && self.idle_for() > threshold
    }

    pub async fn source_playlists(&self) -> Vec<PlaylistRef> {
        self.touch();
        self.playlists.read().await.clone()
    }

    pub async fn destination_playlists(&self) -> Result<Vec<PlaylistRef>> {
        self.touch();
        self.destination
            .list_playlists(&self.destination_identity.user_id)
            .await
    }

    /// Free-text search on the destination, outside of any conversion.
    pub async fn manual_search(&self, query: &str) -> Result<Vec<Track>> {
        self.touch();
        catalog::search_bounded(
            self.destination.as_ref(),
            query,
            "",
            "",
            self.config.search_timeout,
            &self.cancellation_token,
        )
        .await
    }

    /// Answers the conversion's pending manual selection.
    pub async fn respond(&self, decision: Decision) -> Result<()> {
        self.touch();
        let resolver = self
            .active()
            .as_ref()
            .map(|a| a.resolver.clone())
            .ok_or(ConvertError::NoPendingRequest)?;
        resolver.respond(decision).await
    }

    pub fn cancel_conversion(&self) -> bool {
        match self.active().as_ref() {
            Some(active) => {
                active.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Runs one conversion; a session runs at most one at a time.
    pub async fn convert(&self, request: ConversionRequest) -> Result<ConversionSummary> {
        let (channel, resolver) = resolution_channel();
        let cancel = self.cancellation_token.child_token();
        {
            let mut active = self.active();
            if active.is_some() {
                return Err(ConvertError::ConversionInProgress);
            }
            *active = Some(ActiveConversion {
                resolver,
                cancel: cancel.clone(),
            });
        }
        let _guard = ActiveGuard(self);

        let playlist = self
            .playlists
            .read()
            .await
            .iter()
            .find(|p| p.id == request.playlist_id)
            .cloned()
            .ok_or_else(|| ConvertError::PlaylistNotInSession(request.playlist_id.clone()))?;

        let converter = Converter::builder()
            .source(self.source.clone())
            .destination(self.destination.clone(), &self.destination_identity.user_id)
            .config(self.config.clone())
            .sink(Arc::new(self.events.clone()))
            .resolver(channel)
            .cancellation(cancel)
            .build()?;

        let mut job = ConversionJob::new(playlist, request.destination, request.mode)
            .with_ambiguity(request.ambiguity);
        let result = converter.run(&mut job).await;

        // keep tracks fetched during the run for the next conversion
        if job.source.is_populated() {
            let mut playlists = self.playlists.write().await;
            if let Some(cached) = playlists.iter_mut().find(|p| p.id == job.source.id) {
                if !cached.is_populated() {
                    cached.tracks = job.source.tracks.clone();
                }
            }
        }

        result
    }
}

/// All logged-in sessions. Created on login, removed on logout or once stale.
pub struct SessionStore {
    sessions: RwLock<HashMap<Uuid, Arc<Session>>>,
    config: ConverterConfig,
}

impl SessionStore {
    pub fn new(config: ConverterConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Logs into both catalogs and loads the source playlists with their
    /// tracks. Nothing is stored unless both logins succeed.
    pub async fn login(&self, source: CatalogAccount, destination: CatalogAccount) -> Result<Arc<Session>> {
        let source_identity = authenticate(&source).await?;
        let destination_identity = authenticate(&destination).await?;

        let mut playlists = source
            .catalog
            .list_playlists(&source_identity.user_id)
            .await?;
        let failures = prime_playlists(source.catalog.as_ref(), &mut playlists).await;
        if !failures.is_empty() {
            warn!(
                "{} source playlists could not be loaded, they will be fetched on conversion",
                failures.len()
            );
        }

        let (events, _) = broadcast::channel(self.config.event_channel_capacity);
        let session = Arc::new(Session {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            source_identity,
            destination_identity,
            source: source.catalog,
            destination: destination.catalog,
            playlists: RwLock::new(playlists),
            events,
            active: Mutex::new(None),
            cancellation_token: CancellationToken::new(),
            last_activity: Mutex::new(Instant::now()),
            config: self.config.clone(),
        });

        info!(
            "Session {} created for {} -> {}",
            session.id, session.source_identity.display_name, session.destination_identity.display_name
        );
        self.sessions.write().await.insert(session.id, session.clone());
        Ok(session)
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<Session>> {
        let session = self
            .sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(ConvertError::SessionNotFound)?;
        session.touch();
        Ok(session)
    }

    /// Removes the session and cancels anything it is running.
    pub async fn logout(&self, id: Uuid) -> Result<()> {
        let session = self
            .sessions
            .write()
            .await
            .remove(&id)
            .ok_or(ConvertError::SessionNotFound)?;
        session.cancellation_token.cancel();
        info!("Session {} logged out", id);
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Drops sessions idle past the configured threshold with no conversion
    /// running and nobody listening. Returns how many were removed.
    pub async fn cleanup_stale(&self) -> usize {
        let threshold = self.config.session_stale_after;
        let mut sessions = self.sessions.write().await;
        let stale: Vec<Uuid> = sessions
            .iter()
            .filter(|(_, session)| session.is_stale(threshold))
            .map(|(id, _)| *id)
            .collect();

        for id in &stale {
            info!("Cleaning up stale session: {}", id);
            if let Some(session) = sessions.remove(id) {
                session.cancellation_token.cancel();
            }
        }
        stale.len()
    }

    /// Periodically runs [`SessionStore::cleanup_stale`] until the store is dropped.
    pub fn spawn_cleanup_task(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        info!(
            "Started session cleanup task (interval: {}s, stale threshold: {}s)",
            every.as_secs(),
            self.config.session_stale_after.as_secs()
        );
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let Some(store) = store.upgrade() else { break };
                store.cleanup_stale().await;
            }
        })
    }
}

async fn authenticate(account: &CatalogAccount) -> Result<Identity> {
    account
        .auth
        .login(&account.credential)
        .await
        .map_err(|e| match e {
            ConvertError::Auth(_) => e,
            other => ConvertError::Auth(format!("{}: {}", account.catalog.name(), other)),
        })
}
