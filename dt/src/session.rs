//! TripSession - the owned context one planning session runs in
//!
//! Holds the active origin, the current itinerary, the chat and the event bus.
//! Everything the presentation layer needs goes through here.

use std::sync::Arc;

use eyre::{Context, Result};
use tokio::sync::{Mutex, MutexGuard, broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chat::{ChatError, OfflineAssistant, PreferenceChat, template_explanation};
use crate::config::Config;
use crate::domain::tags::{allowed_tags, normalize_tags};
use crate::domain::{Coordinate, Itinerary, Origin, PreferenceSet};
use crate::events::{EventBus, TripEvent};
use crate::geo::{GeoResolver, GeolocationProvider, NoGeolocation, ResolveTrigger, StaticGeolocation};
use crate::itinerary::{AssembleError, ItineraryAssembler};
use crate::route::{DirectionsProvider, OsrmDirections};
use crate::service::{Assistant, DisabledPlanner, HttpPlannerClient, PlannerApi};

/// Result of a build request that was not rejected outright
#[derive(Debug, Clone)]
pub enum BuildOutcome {
    /// A new itinerary replaced the previous one
    Updated(Arc<Itinerary>),
    /// Another build was running, or the session was shut down
    Ignored,
}

/// Collaborators a session is built from
pub struct SessionParts {
    pub planner: Arc<dyn PlannerApi>,
    pub assistant: Arc<dyn Assistant>,
    pub geolocation: Arc<dyn GeolocationProvider>,
    pub directions: Option<Arc<dyn DirectionsProvider>>,
}

pub struct TripSession {
    resolver: GeoResolver,
    assembler: ItineraryAssembler,
    planner: Arc<dyn PlannerApi>,
    chat: Mutex<PreferenceChat>,
    itinerary_tx: watch::Sender<Option<Arc<Itinerary>>>,
    events: EventBus,
    cancel: CancellationToken,
}

impl TripSession {
    pub fn new(config: Config, parts: SessionParts) -> Result<Self> {
        debug!(city = %config.geo.city, "TripSession::new: called");
        let events = EventBus::default();
        let cancel = CancellationToken::new();
        let resolver = GeoResolver::from_config(&config.geo, parts.geolocation, events.clone(), cancel.child_token())
            .context("Failed to set up origin resolution")?;
        let assembler = ItineraryAssembler::from_config(&config, Some(parts.planner.clone()), parts.directions);
        let chat = PreferenceChat::new(parts.assistant, events.clone(), cancel.child_token());
        let (itinerary_tx, _) = watch::channel(None);

        Ok(Self {
            resolver,
            assembler,
            planner: parts.planner,
            chat: Mutex::new(chat),
            itinerary_tx,
            events,
            cancel,
        })
    }

    /// Wire up the live service, or the offline fallbacks when `offline` is set
    /// or the service is disabled in config
    pub fn from_config(config: Config, offline: bool) -> Result<Self> {
        debug!(offline, service_enabled = config.service.enabled, "TripSession::from_config: called");
        let use_service = config.service.enabled && !offline;

        let (planner, assistant): (Arc<dyn PlannerApi>, Arc<dyn Assistant>) = if use_service {
            let client = Arc::new(HttpPlannerClient::from_config(&config.service).context("Failed to create planning client")?);
            let planner: Arc<dyn PlannerApi> = client.clone();
            let assistant: Arc<dyn Assistant> = client;
            (planner, assistant)
        } else {
            info!("Planning service off, using demo points and built-in questions");
            let planner: Arc<dyn PlannerApi> = Arc::new(DisabledPlanner);
            let assistant: Arc<dyn Assistant> = Arc::new(OfflineAssistant::new(config.geo.city.clone()));
            (planner, assistant)
        };

        let directions: Option<Arc<dyn DirectionsProvider>> = if config.directions.enabled && !offline {
            Some(Arc::new(
                OsrmDirections::from_config(&config.directions).context("Failed to create directions client")?,
            ))
        } else {
            None
        };

        let geolocation: Arc<dyn GeolocationProvider> = match &config.geo.device {
            Some(device) => Arc::new(StaticGeolocation::new(
                device.coordinate().context("Invalid device position")?,
                device.accuracy_m,
            )),
            None => Arc::new(NoGeolocation),
        };

        Self::new(
            config,
            SessionParts {
                planner,
                assistant,
                geolocation,
                directions,
            },
        )
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<TripEvent> {
        self.events.subscribe()
    }

    pub fn origin(&self) -> Origin {
        self.resolver.current()
    }

    pub fn subscribe_origin(&self) -> watch::Receiver<Origin> {
        self.resolver.subscribe()
    }

    /// The itinerary currently on display
    pub fn itinerary(&self) -> Option<Arc<Itinerary>> {
        self.itinerary_tx.borrow().clone()
    }

    pub fn subscribe_itinerary(&self) -> watch::Receiver<Option<Arc<Itinerary>>> {
        self.itinerary_tx.subscribe()
    }

    pub async fn use_city(&self) -> Option<Origin> {
        self.resolver.resolve(ResolveTrigger::UseCity).await
    }

    /// Ask the device for a position; on failure the walk starts from the city center
    pub async fn use_device(&self) -> Option<Origin> {
        let origin = self.resolver.resolve(ResolveTrigger::UseDevice).await;
        if origin.is_none() && !self.cancel.is_cancelled() {
            self.events.warn("Could not determine your location, starting from the city center");
        }
        origin
    }

    /// Wait for the next [`map_click`](Self::map_click)
    pub async fn begin_map_pick(&self) -> Option<Origin> {
        self.resolver.resolve(ResolveTrigger::UseMapPick).await
    }

    pub fn map_click(&self, coordinate: Coordinate) -> bool {
        self.resolver.map_click(coordinate)
    }

    pub fn cancel_map_pick(&self) {
        self.resolver.cancel_pick();
    }

    pub fn is_building(&self) -> bool {
        self.assembler.is_building()
    }

    /// Build an itinerary from `prefs` starting at the active origin
    ///
    /// A build requested while another is running is ignored, as is a result
    /// that arrives after [`shutdown`](Self::shutdown).
    pub async fn build(&self, prefs: &PreferenceSet) -> Result<BuildOutcome, AssembleError> {
        debug!(fields = prefs.len(), "build: called");
        if self.cancel.is_cancelled() {
            return Ok(BuildOutcome::Ignored);
        }
        let origin = self.resolver.current();

        let result = tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!("build: torn down while assembling");
                return Ok(BuildOutcome::Ignored);
            }
            result = self.assembler.assemble(prefs, origin) => result,
        };
        let itinerary = match result {
            Ok(itinerary) => Arc::new(itinerary),
            Err(AssembleError::Busy) => {
                debug!("build: another build in flight, ignoring");
                return Ok(BuildOutcome::Ignored);
            }
            Err(e) => return Err(e),
        };
        if self.cancel.is_cancelled() {
            return Ok(BuildOutcome::Ignored);
        }

        for warning in &itinerary.warnings {
            self.events.warn(warning.clone());
        }
        self.itinerary_tx.send_replace(Some(itinerary.clone()));
        self.events.emit(TripEvent::ItineraryUpdated {
            stop_count: itinerary.stops.len(),
            data_source: itinerary.data_source,
            used_fallback_route: itinerary.route.used_fallback,
        });
        Ok(BuildOutcome::Updated(itinerary))
    }

    /// Build from the preferences the chat declared ready
    pub async fn build_from_chat(&self) -> Result<BuildOutcome, AssembleError> {
        let prefs = self
            .chat
            .lock()
            .await
            .ready_prefs()
            .cloned()
            .ok_or_else(|| AssembleError::InvalidPreferences("the conversation has not finished yet".to_string()))?;
        self.build(&prefs).await
    }

    /// Exclusive access to the chat; callers queue behind each other
    pub async fn chat(&self) -> MutexGuard<'_, PreferenceChat> {
        self.chat.lock().await
    }

    pub async fn chat_open(&self) -> Result<(), ChatError> {
        self.chat.lock().await.open().await
    }

    pub async fn chat_choose(&self, option: impl Into<String>) -> Result<(), ChatError> {
        self.chat.lock().await.choose(option).await
    }

    pub async fn chat_toggle(&self, option: impl Into<String>) -> Result<(), ChatError> {
        self.chat.lock().await.toggle(option).await
    }

    pub async fn chat_confirm(&self) -> Result<(), ChatError> {
        self.chat.lock().await.confirm().await
    }

    pub async fn chat_send(&self, text: impl Into<String>) -> Result<(), ChatError> {
        self.chat.lock().await.send_text(text).await
    }

    pub async fn chat_restart(&self) -> Result<(), ChatError> {
        self.chat.lock().await.restart().await
    }

    /// Short description of the current route, from the service or a template
    pub async fn explain(&self, prefs: &PreferenceSet) -> String {
        let stops = self.itinerary().map(|i| i.stops.clone()).unwrap_or_default();
        match self.planner.explain(prefs, &stops).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => template_explanation(&stops),
            Err(e) => {
                debug!(error = %e, "explain: using template");
                template_explanation(&stops)
            }
        }
    }

    /// Canonical interest tags, from the service or the local vocabulary
    pub async fn tags(&self) -> Vec<String> {
        match self.planner.tags().await {
            Ok(tags) if !tags.is_empty() => tags,
            Ok(_) => allowed_tags(),
            Err(e) => {
                debug!(error = %e, "tags: using local vocabulary");
                allowed_tags()
            }
        }
    }

    pub async fn normalize_tags(&self, tags: &[String]) -> Vec<String> {
        match self.planner.normalize_tags(tags).await {
            Ok(normalized) => normalized,
            Err(e) => {
                debug!(error = %e, "normalize_tags: using local vocabulary");
                normalize_tags(tags)
            }
        }
    }

    /// Calendar text for the current itinerary; `None` when there is nothing to export
    pub fn export_calendar(&self) -> Option<String> {
        let itinerary = self.itinerary()?;
        if itinerary.is_empty() {
            return None;
        }
        Some(self.assembler.calendar().export(&itinerary))
    }

    /// Tear down: pending picks, geolocation, chat requests and builds are abandoned
    pub fn shutdown(&self) {
        if !self.cancel.is_cancelled() {
            info!("Shutting down trip session");
        }
        self.cancel.cancel();
    }
}

impl Drop for TripSession {
    fn drop(&mut self) {
        if !self.cancel.is_cancelled() {
            warn!("TripSession dropped without shutdown");
            self.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatPhase;
    use crate::domain::{DataSource, OriginSource};
    use crate::service::mock::MockPlanner;
    use std::time::Duration;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    fn prefs() -> PreferenceSet {
        let mut prefs = PreferenceSet::new();
        prefs.set("date", "2025-10-26");
        prefs
    }

    fn session(planner: MockPlanner) -> TripSession {
        session_with(Arc::new(planner))
    }

    fn session_with(planner: Arc<MockPlanner>) -> TripSession {
        let mut config = Config::default();
        config.directions.enabled = false;
        TripSession::new(
            config,
            SessionParts {
                planner,
                assistant: Arc::new(OfflineAssistant::new("Rostov-on-Don")),
                geolocation: Arc::new(StaticGeolocation::new(coord(47.23, 39.72), Some(30.0))),
                directions: None,
            },
        )
        .unwrap()
    }

    fn stops() -> MockPlanner {
        MockPlanner::new(&[
            ("Museum", 47.2225, 39.7143),
            ("Park", 47.2227, 39.7116),
            ("Embankment", 47.2163, 39.7197),
        ])
    }

    #[tokio::test]
    async fn test_build_publishes_itinerary() {
        let session = session(stops());
        let mut rx = session.subscribe_itinerary();
        let mut events = session.subscribe_events();

        let outcome = session.build(&prefs()).await.unwrap();
        let BuildOutcome::Updated(itinerary) = outcome else {
            panic!("expected an update");
        };
        assert_eq!(itinerary.stops.len(), 3);
        assert_eq!(itinerary.data_source, DataSource::Provider);
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().as_ref().map(|i| i.stops.len()), Some(3));

        let mut saw_update = false;
        while let Ok(event) = events.try_recv() {
            saw_update |= matches!(event, TripEvent::ItineraryUpdated { stop_count: 3, .. });
        }
        assert!(saw_update);
    }

    #[tokio::test]
    async fn test_second_build_while_running_is_ignored() {
        let planner = Arc::new(stops().with_delay(Duration::from_millis(200)));
        let session = Arc::new(session_with(planner.clone()));

        let first = {
            let session = session.clone();
            tokio::spawn(async move { session.build(&prefs()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(session.is_building());

        let second = session.build(&prefs()).await.unwrap();
        assert!(matches!(second, BuildOutcome::Ignored));
        assert!(matches!(first.await.unwrap().unwrap(), BuildOutcome::Updated(_)));
        assert!(session.itinerary().is_some());
        assert_eq!(planner.plan_calls(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_discards_in_flight_build() {
        let session = Arc::new(session(stops().with_delay(Duration::from_millis(200))));
        let build = {
            let session = session.clone();
            tokio::spawn(async move { session.build(&prefs()).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        session.shutdown();

        assert!(matches!(build.await.unwrap().unwrap(), BuildOutcome::Ignored));
        assert!(session.itinerary().is_none());
        assert!(matches!(session.build(&prefs()).await.unwrap(), BuildOutcome::Ignored));
    }

    #[tokio::test]
    async fn test_configured_city_sets_origin() {
        let mut config = Config::default();
        config.geo.city = "Taganrog".to_string();
        let session = TripSession::from_config(config, true).unwrap();
        assert_eq!(session.origin(), Origin::city(coord(47.2096, 38.9358)));
        session.shutdown();
    }

    #[tokio::test]
    async fn test_device_origin_then_build() {
        let session = session(stops());
        let origin = session.use_device().await.unwrap();
        assert_eq!(origin.source, OriginSource::Geolocation);
        assert_eq!(session.origin(), origin);

        let BuildOutcome::Updated(itinerary) = session.build(&prefs()).await.unwrap() else {
            panic!("expected an update");
        };
        assert_eq!(itinerary.route.legs[0].from, coord(47.23, 39.72));
    }

    #[tokio::test]
    async fn test_map_pick_through_session() {
        let session = Arc::new(session(stops()));
        let pick = {
            let session = session.clone();
            tokio::spawn(async move { session.begin_map_pick().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(session.map_click(coord(47.21, 39.70)));

        let origin = pick.await.unwrap().unwrap();
        assert_eq!(origin.source, OriginSource::MapPick);
        assert_eq!(session.origin().coordinate, coord(47.21, 39.70));
    }

    #[tokio::test]
    async fn test_invalid_prefs_rejected() {
        let session = session(stops());
        let err = session.build(&PreferenceSet::new()).await.unwrap_err();
        assert!(matches!(err, AssembleError::InvalidPreferences(_)));
        assert!(session.itinerary().is_none());
    }

    #[tokio::test]
    async fn test_build_from_chat() {
        let session = session(stops());
        assert!(session.build_from_chat().await.is_err());

        session.chat_open().await.unwrap();
        session.chat_send("2025-10-26").await.unwrap();
        session.chat_toggle("museum").await.unwrap();
        session.chat_confirm().await.unwrap();
        session.chat_choose("medium").await.unwrap();
        session.chat_choose("normal").await.unwrap();
        assert_eq!(session.chat().await.state().phase(), ChatPhase::Ready);

        assert!(matches!(session.build_from_chat().await.unwrap(), BuildOutcome::Updated(_)));
    }

    #[tokio::test]
    async fn test_service_fallbacks() {
        let session = session(MockPlanner::failing());
        assert_eq!(session.tags().await, allowed_tags());
        assert_eq!(
            session.normalize_tags(&["Museums".to_string()]).await,
            vec!["museum".to_string()]
        );
        assert!(session.explain(&prefs()).await.contains("empty"));

        // Planner down: demo points still give a full itinerary
        let BuildOutcome::Updated(itinerary) = session.build(&prefs()).await.unwrap() else {
            panic!("expected an update");
        };
        assert_eq!(itinerary.data_source, DataSource::Seed);
        assert!(session.explain(&prefs()).await.starts_with("Start at"));
    }

    #[tokio::test]
    async fn test_service_answers_used() {
        let session = session(stops());
        assert_eq!(session.tags().await, vec!["museum", "park"]);
        assert_eq!(session.normalize_tags(&["art".to_string()]).await, vec!["ART"]);
    }

    #[tokio::test]
    async fn test_export_calendar() {
        let session = session(stops());
        assert!(session.export_calendar().is_none());

        session.build(&prefs()).await.unwrap();
        let ics = session.export_calendar().unwrap();
        assert_eq!(ics.matches("BEGIN:VEVENT").count(), 3);
    }
}
