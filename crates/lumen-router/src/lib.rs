//! Navigation state for the Lumen front-end.
//!
//! A [`Router`] keeps a stack of [`RouteConfiguration`]s (usually a single
//! entry) and notifies subscribers whenever the visible configuration
//! changes. Requests that would not change anything are ignored, so
//! listeners never see redundant notifications.

use std::collections::BTreeMap;

use lumen_core::{Notifier, Subscription};
use parking_lot::Mutex;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::form_urlencoded;
use url::{Position, Url};

/// Map key carrying [`NavigationState::kind`] in the flattened form.
pub const KIND_KEY: &str = "_kind";

const URI_BASE: &str = "lumen:///";

/// Characters escaped in the page segment. `%` is included so literal escapes
/// in page names survive decoding.
const PAGE_ESCAPES: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

pub type Result<T, E = RouteError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid route uri: {0}")]
    InvalidUri(#[from] url::ParseError),
    #[error("navigation state is missing the `_kind` key")]
    MissingKind,
    #[error("invalid navigation state json: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Args = BTreeMap<String, String>;

/// Argument changes for [`Router::navigate`]; `None` removes the key.
pub type ArgDelta = BTreeMap<String, Option<String>>;

/// Page-specific state, e.g. the selected object of an inspector page.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct NavigationState {
    pub kind: String,
    pub state: BTreeMap<String, String>,
}

impl NavigationState {
    pub fn new<I, K, V>(kind: impl Into<String>, state: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            kind: kind.into(),
            state: state
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Flatten into a single map with the kind under [`KIND_KEY`].
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let mut map = self.state.clone();
        map.insert(KIND_KEY.to_string(), self.kind.clone());
        map
    }

    pub fn from_map(mut map: BTreeMap<String, String>) -> Result<Self> {
        let kind = map.remove(KIND_KEY).ok_or(RouteError::MissingKind)?;
        Ok(Self { kind, state: map })
    }

    pub fn to_json(&self) -> String {
        // A map of strings always serializes.
        serde_json::to_string(&self.to_map()).unwrap_or_default()
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let map: BTreeMap<String, String> = serde_json::from_str(text)?;
        Self::from_map(map)
    }

    /// `delta` merged over `self` when both have the same kind; `delta`
    /// alone otherwise.
    pub fn merged(&self, delta: &NavigationState) -> NavigationState {
        if self.kind != delta.kind {
            return delta.clone();
        }
        let mut state = self.state.clone();
        state.extend(delta.state.iter().map(|(k, v)| (k.clone(), v.clone())));
        NavigationState {
            kind: self.kind.clone(),
            state,
        }
    }
}

impl TryFrom<BTreeMap<String, String>> for NavigationState {
    type Error = RouteError;

    fn try_from(map: BTreeMap<String, String>) -> Result<Self> {
        Self::from_map(map)
    }
}

impl From<NavigationState> for BTreeMap<String, String> {
    fn from(state: NavigationState) -> Self {
        state.to_map()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteConfiguration {
    pub page: String,
    #[serde(default)]
    pub args: Args,
    #[serde(default)]
    pub state: Option<NavigationState>,
}

impl RouteConfiguration {
    pub fn new(page: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            ..Self::default()
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }

    /// Render as `/page?arg=value#state`, the state being the form-encoded
    /// [`NavigationState::to_map`].
    pub fn to_uri(&self) -> String {
        let Ok(mut url) = Url::parse(URI_BASE) else {
            return format!("/{}", self.page);
        };
        url.set_path(&utf8_percent_encode(&self.page, PAGE_ESCAPES).to_string());
        if !self.args.is_empty() {
            url.query_pairs_mut().extend_pairs(&self.args);
        }
        if let Some(state) = &self.state {
            let fragment = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(state.to_map())
                .finish();
            url.set_fragment(Some(&fragment));
        }
        url[Position::BeforePath..].to_string()
    }

    pub fn from_uri(uri: &str) -> Result<Self> {
        let url = Url::parse(URI_BASE)?.join(uri)?;
        let page = percent_decode_str(url.path().trim_start_matches('/'))
            .decode_utf8_lossy()
            .into_owned();
        let args = url.query_pairs().into_owned().collect();
        let state = match url.fragment() {
            Some(fragment) if !fragment.is_empty() => Some(NavigationState::from_map(
                form_urlencoded::parse(fragment.as_bytes())
                    .into_owned()
                    .collect(),
            )?),
            _ => None,
        };
        Ok(Self { page, args, state })
    }
}

/// Stack of route configurations with change notification.
pub struct Router {
    stack: Mutex<Vec<RouteConfiguration>>,
    notifier: Notifier<RouteConfiguration>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new(RouteConfiguration::default())
    }
}

impl Router {
    pub fn new(initial: RouteConfiguration) -> Self {
        Self {
            stack: Mutex::new(vec![initial]),
            notifier: Notifier::new(),
        }
    }

    /// The visible (top) configuration.
    pub fn current(&self) -> RouteConfiguration {
        self.stack.lock().last().cloned().unwrap_or_default()
    }

    pub fn depth(&self) -> usize {
        self.stack.lock().len()
    }

    /// Listen for changes of the visible configuration.
    pub fn subscribe(
        &self,
        listener: impl Fn(&RouteConfiguration) + Send + Sync + 'static,
    ) -> Subscription {
        self.notifier.subscribe(listener)
    }

    /// Show `page` with `arg_delta` applied to the current arguments and
    /// `state_delta` merged into the current state.
    ///
    /// Returns `false`, without notifying, when the result equals the current
    /// configuration.
    pub fn navigate(
        &self,
        page: &str,
        arg_delta: &ArgDelta,
        state_delta: Option<&NavigationState>,
    ) -> bool {
        let next = {
            let mut stack = self.stack.lock();
            let current = stack.last().cloned().unwrap_or_default();

            let mut args = current.args.clone();
            for (key, value) in arg_delta {
                match value {
                    Some(value) => args.insert(key.clone(), value.clone()),
                    None => args.remove(key),
                };
            }
            let state = match (current.state.as_ref(), state_delta) {
                (Some(current), Some(delta)) => Some(current.merged(delta)),
                (None, Some(delta)) => Some(delta.clone()),
                (current, None) => current.cloned(),
            };
            let next = RouteConfiguration {
                page: page.to_string(),
                args,
                state,
            };

            if next == current {
                return false;
            }
            match stack.last_mut() {
                Some(top) => *top = next.clone(),
                None => stack.push(next.clone()),
            }
            next
        };

        tracing::debug!(target: "lumen.router", page = %next.page, "navigated");
        self.notifier.notify(&next);
        true
    }

    pub fn update_args_if_changed(&self, arg_delta: &ArgDelta) -> bool {
        let page = self.current().page;
        self.navigate(&page, arg_delta, None)
    }

    pub fn update_state_if_changed(&self, state: &NavigationState) -> bool {
        let page = self.current().page;
        self.navigate(&page, &ArgDelta::new(), Some(state))
    }

    /// Show an auxiliary configuration on top of the current one.
    pub fn push(&self, config: RouteConfiguration) {
        self.stack.lock().push(config.clone());
        self.notifier.notify(&config);
    }

    /// Remove the top configuration unless it is the only one.
    pub fn pop(&self) -> bool {
        let top = {
            let mut stack = self.stack.lock();
            if stack.len() <= 1 {
                return false;
            }
            stack.pop();
            stack.last().cloned().unwrap_or_default()
        };
        self.notifier.notify(&top);
        true
    }
}
