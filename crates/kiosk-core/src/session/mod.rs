//! The kiosk session: owned state plus the helper and server loops.
//!
//! A [`Session`] is driven entirely by [`Session::tick`] from the host frame
//! loop. Each tick first routes completed requests (in arrival order), then
//! lets the helper loop and the server loop submit whatever is due. All
//! state mutation happens inside `tick` or [`Session::apply_update`], so
//! merges never interleave.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use kiosk_net::{Completion, Request, Response, Ticket, Transport};
use kiosk_types::config::KioskConfig;
use kiosk_types::error::{KioskError, Result};
use kiosk_types::launch::LaunchParams;
use serde_json::{Map, Value, json};

use crate::commands::{self, CommandEffect};
use crate::definition::{self, Definition};
use crate::scheduler::{HelperAction, HelperLoop, HelperPhase, ServerLoop};
use crate::state::{ERROR_MISSING_CONTENT, ERROR_SOFTWARE_UPDATE, Permissions, SessionState};
use crate::update::{Update, UpdateSource, arrays_equal};

/// App hook that sees every raw update after the generic merge.
pub type UpdateParser = Box<dyn FnMut(&Value) -> Result<()>>;

/// App hook that renders a freshly loaded definition for the running app.
pub type DefinitionLoader = Box<dyn FnMut(&Definition) -> Result<()>>;

/// Something the host must react to.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The helper did not answer the bootstrap request; show the banner.
    HelperUnreachable,
    /// The helper answered after being unreachable; hide the banner.
    HelperReachable,
    /// Reload the running app from scratch.
    ReloadPage,
    /// Leave this app for another app's page. The session stops working
    /// once this is emitted.
    Navigate { path: String },
    /// A definition for the running app finished loading.
    DefinitionLoaded(Definition),
}

/// What one call to [`Session::apply_update`] changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Command effects dispatched.
    pub commands: usize,
    pub identity_changed: bool,
    pub server_address_changed: bool,
    pub helper_address_changed: bool,
    pub exhibit_changed: bool,
    pub content_changed: bool,
    pub errors_changed: bool,
    pub permissions_changed: bool,
    /// A `/setDefaults` acknowledgement was sent.
    pub acknowledged: bool,
    /// A definition load was started for this id.
    pub definition_requested: Option<String>,
}

impl MergeOutcome {
    /// Whether the update changed nothing and sent nothing.
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

/// What an in-flight ticket is for.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Pending {
    Bootstrap,
    ReloadDefaults,
    UpdatePoll,
    Ping,
    DefinitionLoad(String),
    /// Fire-and-forget helper call; the label is for the log.
    Action(String),
}

/// Synchronization state of one running kiosk app.
pub struct Session<T: Transport> {
    config: KioskConfig,
    state: SessionState,
    transport: T,
    next_ticket: Ticket,
    pending: HashMap<Ticket, Pending>,
    helper: HelperLoop,
    server: ServerLoop,
    events: Vec<SessionEvent>,
    update_parser: Option<UpdateParser>,
    definition_loader: Option<DefinitionLoader>,
    /// Definition from the launch parameters, loaded on the first tick.
    launch_definition: Option<String>,
    /// Latest definition asked for whose load has not resolved yet.
    requested_definition: Option<String>,
    /// `None` until the first bootstrap attempt resolves.
    helper_reachable: Option<bool>,
    last_interaction: Option<Instant>,
    navigating: bool,
}

impl<T: Transport> Session<T> {
    pub fn new(config: KioskConfig, launch: LaunchParams, transport: T) -> Self {
        let state = SessionState::new(&config, &launch);
        let launch_definition = if launch.standalone {
            launch.definition
        } else {
            None
        };
        log::info!(
            "Session for {} (helper {}, standalone: {})",
            state.app_id,
            state.helper_address,
            state.standalone
        );
        Self {
            helper: HelperLoop::new(
                config.helper_poll_interval(),
                config.bootstrap_retry(),
                config.bootstrap_timeout(),
            ),
            server: ServerLoop::new(config.server_ping_interval()),
            config,
            state,
            transport,
            next_ticket: 1,
            pending: HashMap::new(),
            events: Vec::new(),
            update_parser: None,
            definition_loader: None,
            launch_definition,
            requested_definition: None,
            helper_reachable: None,
            last_interaction: None,
            navigating: false,
        }
    }

    /// Register the app-specific update parser.
    pub fn with_update_parser(mut self, parser: impl FnMut(&Value) -> Result<()> + 'static) -> Self {
        self.update_parser = Some(Box::new(parser));
        self
    }

    /// Register the callback that renders a loaded definition.
    pub fn with_definition_loader(
        mut self,
        loader: impl FnMut(&Definition) -> Result<()> + 'static,
    ) -> Self {
        self.definition_loader = Some(Box::new(loader));
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> &KioskConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn helper_phase(&self) -> HelperPhase {
        self.helper.phase()
    }

    /// False only after a failed bootstrap that has not yet been followed
    /// by a successful one.
    pub fn helper_reachable(&self) -> bool {
        self.helper_reachable != Some(false)
    }

    /// Whether a [`SessionEvent::Navigate`] has been emitted.
    pub fn is_navigating(&self) -> bool {
        self.navigating
    }

    /// Take every event emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// Note user activity at `now`.
    pub fn record_interaction(&mut self, now: Instant) {
        self.last_interaction = Some(now);
    }

    /// Whether the kiosk is in use at `now`.
    pub fn current_interaction(&self, now: Instant) -> bool {
        self.last_interaction
            .is_some_and(|at| now.saturating_duration_since(at) < self.config.interaction_window())
    }

    /// Advance the session to `now`.
    pub fn tick(&mut self, now: Instant) {
        if self.navigating {
            return;
        }

        for completion in self.transport.poll() {
            self.handle_completion(completion, now);
            if self.navigating {
                return;
            }
        }

        if let Some(id) = self.launch_definition.take() {
            log::info!("Standalone launch with definition {id}");
            self.load_definition(&id);
        }

        if self.helper.bootstrap_overdue(now) {
            log::warn!("Bootstrap request went unanswered; retrying");
            self.pending.retain(|_, p| *p != Pending::Bootstrap);
            self.helper.bootstrap_failed(now);
            self.set_helper_reachable(false);
        }

        match self.helper.next_action(now) {
            Some(HelperAction::Bootstrap) => {
                let request = self
                    .defaults_request()
                    .with_timeout(self.config.bootstrap_timeout());
                self.submit(request, Pending::Bootstrap);
            },
            Some(HelperAction::Poll) => {
                let request = Request::get(&self.state.helper_address, "/getUpdate")
                    .with_timeout(self.config.helper_poll_timeout());
                self.submit(request, Pending::UpdatePoll);
            },
            None => {},
        }

        if self.server.due(now, self.state.has_server()) {
            self.send_ping(now);
        }
    }

    /// Merge one raw update into the session state and carry out its side
    /// effects. Never fails; malformed fields are skipped.
    pub fn apply_update(&mut self, raw: &Value, source: UpdateSource) -> MergeOutcome {
        let update = Update::from_value(raw);
        let mut outcome = MergeOutcome::default();
        if !update.is_empty() {
            log::debug!("Update from {}: {raw}", source.as_str());
        }

        if let Some(ref tokens) = update.commands {
            outcome.commands = self.dispatch(tokens);
        }

        if let Some(ref id) = update.id {
            outcome.identity_changed |= replace(&mut self.state.id, id);
        }
        if let Some(ref group) = update.group {
            outcome.identity_changed |= replace(&mut self.state.group, group);
        }

        if let Some(address) = update.server_address() {
            if replace(&mut self.state.server_address, &address) {
                log::info!("Control server address is now {address}");
                outcome.server_address_changed = true;
            }
        }

        if let Some(ref address) = update.helper_address {
            outcome.helper_address_changed = replace(&mut self.state.helper_address, address);
        }

        let mut ack = Map::new();
        if let Some(ref exhibit) = update.current_exhibit {
            if replace(&mut self.state.current_exhibit, exhibit) {
                log::info!("Current exhibit is now {exhibit}");
                outcome.exhibit_changed = true;
                ack.insert("current_exhibit".to_string(), json!(exhibit));
            }
        }
        if let Some(ref content) = update.content {
            if !arrays_equal(&self.state.current_content, content) {
                self.state.current_content = content.clone();
                outcome.content_changed = true;
                ack.insert("content".to_string(), json!(content));
            }
        }
        if !ack.is_empty() && source == UpdateSource::Server {
            self.send_config_update(ack);
            outcome.acknowledged = true;
        }

        if let Some(warnings) = update.missing_content_warnings {
            let previous = self
                .state
                .error_dict
                .insert(ERROR_MISSING_CONTENT.to_string(), warnings.clone());
            outcome.errors_changed |= previous.as_ref() != Some(&warnings);
        }
        if let Some(sw) = update.software_update {
            // Recorded only while an update is available; nothing clears it.
            if sw.update_available {
                let previous = self
                    .state
                    .error_dict
                    .insert(ERROR_SOFTWARE_UPDATE.to_string(), sw.details.clone());
                outcome.errors_changed |= previous.as_ref() != Some(&sw.details);
            }
        }

        if let Some(permissions) = update.permissions {
            let permissions = Permissions::from(permissions);
            if self.state.permissions != permissions {
                self.state.permissions = permissions;
                outcome.permissions_changed = true;
            }
        }
        for (name, granted) in update.allow {
            if self.state.permissions.get(&name) != Some(granted) {
                self.state.permissions.set(name, granted);
                outcome.permissions_changed = true;
            }
        }

        if let Some(id) = update.definition {
            if self.should_load_definition(&id, source) {
                self.load_definition(&id);
                outcome.definition_requested = Some(id);
            }
        }

        if let Some(ref mut parser) = self.update_parser {
            run_guarded("update parser", || parser(raw));
        }

        outcome
    }

    /// Run `tokens` through the command vocabulary. Returns how many
    /// effects were carried out.
    pub fn dispatch(&mut self, tokens: &[String]) -> usize {
        let effects = commands::plan(tokens, &self.state.helper_address, &self.state.permissions);
        let count = effects.len();
        for effect in effects {
            match effect {
                CommandEffect::Helper(request) => {
                    let label = format!("{} {}", request.method, request.endpoint);
                    self.submit(request, Pending::Action(label));
                },
                CommandEffect::ReloadPage => self.events.push(SessionEvent::ReloadPage),
                CommandEffect::ReloadDefaults => self.ask_for_defaults(),
            }
        }
        count
    }

    /// Fetch the helper's defaults once, outside the bootstrap loop.
    pub fn ask_for_defaults(&mut self) {
        let request = self.defaults_request();
        self.submit(request, Pending::ReloadDefaults);
    }

    /// Start loading definition `id` from the helper.
    /// A newer request supersedes any load still in flight.
    pub fn load_definition(&mut self, id: &str) {
        self.requested_definition = Some(id.to_string());
        let request = definition::load_request(&self.state.helper_address, id);
        self.submit(request, Pending::DefinitionLoad(id.to_string()));
    }

    /// Leave for `app`'s page. Returns false when the app has no page.
    pub fn goto_app(&mut self, app: &str) -> bool {
        match definition::app_page(app, self.config.other_app_path.as_deref()) {
            Some(path) => {
                log::info!("Switching from {} to {app} at {path}", self.state.app_id);
                self.navigating = true;
                self.events.push(SessionEvent::Navigate { path });
                true
            },
            None => {
                log::warn!("No page known for app {app}; staying on {}", self.state.app_id);
                false
            },
        }
    }

    fn should_load_definition(&self, id: &str, source: UpdateSource) -> bool {
        if self.state.standalone {
            return false;
        }
        if source == UpdateSource::Server && self.config.self_managed_definition {
            return false;
        }
        let latest = self
            .requested_definition
            .as_deref()
            .unwrap_or(&self.state.current_definition);
        !id.is_empty() && id != latest
    }

    fn defaults_request(&self) -> Request {
        if self.config.legacy_helper {
            Request::post(&self.state.helper_address, "/", json!({"action": "getDefaults"}))
        } else {
            Request::get(&self.state.helper_address, "/getDefaults")
        }
    }

    /// Persist the changed fields as the helper's new defaults.
    fn send_config_update(&mut self, defaults: Map<String, Value>) {
        let body = json!({ "defaults": Value::Object(defaults) });
        log::info!("Acknowledging new defaults to helper: {body}");
        let request = Request::post(&self.state.helper_address, "/setDefaults", body);
        self.submit(request, Pending::Action("POST /setDefaults".to_string()));
    }

    fn send_ping(&mut self, now: Instant) {
        let mut body = json!({
            "id": self.state.id,
            "group": self.state.group,
            "helperAddress": self.state.helper_address,
            "permissions": self.state.permissions,
            "constellation_app_id": self.state.app_id,
            "platform_details": self.state.platform_details(),
            "currentInteraction": self.current_interaction(now),
        });
        if !self.state.error_dict.is_empty() {
            body["error"] = json!(self.state.error_dict);
        }
        let request = Request::post(&self.state.server_address, "/system/ping", body)
            .with_timeout(self.config.server_ping_timeout());
        self.submit(request, Pending::Ping);
    }

    fn submit(&mut self, request: Request, purpose: Pending) {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.pending.insert(ticket, purpose);
        self.transport.submit(ticket, request);
    }

    fn handle_completion(&mut self, completion: Completion, now: Instant) {
        let Some(purpose) = self.pending.remove(&completion.ticket) else {
            log::debug!("Dropping completion for unknown ticket {}", completion.ticket);
            return;
        };

        match (purpose, completion.result) {
            (Pending::Bootstrap, Ok(response)) => {
                log::info!("Helper defaults received");
                self.helper.bootstrap_succeeded(now);
                self.set_helper_reachable(true);
                self.apply_update(&response.into_json(), UpdateSource::Helper);
            },
            (Pending::Bootstrap, Err(e)) => {
                log::warn!(
                    "Helper unreachable, retrying in {:?}: {e}",
                    self.config.bootstrap_retry()
                );
                self.helper.bootstrap_failed(now);
                self.set_helper_reachable(false);
            },
            (Pending::ReloadDefaults | Pending::UpdatePoll, Ok(response)) => {
                self.apply_update(&response.into_json(), UpdateSource::Helper);
            },
            (Pending::Ping, Ok(response)) => {
                self.apply_update(&response.into_json(), UpdateSource::Server);
            },
            (Pending::DefinitionLoad(id), Ok(response)) => {
                self.finish_definition_load(&id, response);
            },
            (Pending::Action(label), Ok(_)) => {
                log::debug!("{label} done");
            },
            (Pending::DefinitionLoad(id), Err(e)) => {
                log::warn!("Loading definition {id} failed: {e}");
                if self.requested_definition.as_deref() == Some(id.as_str()) {
                    self.requested_definition = None;
                }
            },
            (_, Err(e)) => {
                log::warn!("{e}");
            },
        }
    }

    fn finish_definition_load(&mut self, id: &str, response: Response) {
        if self.requested_definition.as_deref() != Some(id) {
            log::debug!("Ignoring superseded load of definition {id}");
            return;
        }
        self.requested_definition = None;

        let definition = match response
            .as_json()
            .ok_or_else(|| KioskError::Definition(format!("{id}: expected JSON")))
            .and_then(|v| definition::parse_load_response(id, v))
        {
            Ok(d) => d,
            Err(e) => {
                log::warn!("{e}");
                return;
            },
        };

        self.state.current_definition = id.to_string();
        if let Some(app) = definition.app() {
            if app != self.state.app_id {
                let app = app.to_string();
                if self.goto_app(&app) {
                    return;
                }
            }
        }

        log::info!("Definition {id} loaded");
        if let Some(ref mut loader) = self.definition_loader {
            run_guarded("definition loader", || loader(&definition));
        }
        self.events.push(SessionEvent::DefinitionLoaded(definition));
    }

    fn set_helper_reachable(&mut self, reachable: bool) {
        let previous = self.helper_reachable.replace(reachable);
        match (previous, reachable) {
            (Some(false), true) => self.events.push(SessionEvent::HelperReachable),
            (None | Some(true), false) => self.events.push(SessionEvent::HelperUnreachable),
            _ => {},
        }
    }
}

/// Overwrite `slot` with `value`; true if it changed.
fn replace(slot: &mut String, value: &str) -> bool {
    if slot == value {
        return false;
    }
    *slot = value.to_string();
    true
}

/// Run an app hook, logging its error or panic instead of propagating it.
fn run_guarded(name: &str, hook: impl FnOnce() -> Result<()>) {
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(Ok(())) => {},
        Ok(Err(e)) => log::error!("{name} failed: {e}"),
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("{name} panicked: {msg}");
        },
    }
}

#[cfg(test)]
mod tests;
