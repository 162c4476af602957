use std::collections::HashMap;

use url::Url;

use crate::error::{Result, TrackerError};

mod announce;
pub mod udp;

pub use self::announce::{AnnounceEvent, AnnounceRequest, AnnounceResponse, PeerAddress};

/// A client bound to one tracker URL.
pub trait TrackerClient: Send {
    fn announce(&mut self, request: &AnnounceRequest) -> Result<AnnounceResponse>;
}

pub type ClientConstructor = fn(&Url) -> Result<Box<dyn TrackerClient>>;

/// Maps URL schemes to client constructors, so code holding only an announce
/// URL can get a client without knowing which protocol serves it.
#[derive(Clone, Default)]
pub struct ClientRegistry {
    constructors: HashMap<String, ClientConstructor>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that knows every protocol this crate implements.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        udp::register(&mut registry);
        registry
    }

    /// Returns the constructor previously registered for `scheme`, if any.
    pub fn register(
        &mut self,
        scheme: &str,
        constructor: ClientConstructor,
    ) -> Option<ClientConstructor> {
        self.constructors.insert(scheme.to_ascii_lowercase(), constructor)
    }

    pub fn supports(&self, scheme: &str) -> bool {
        self.constructors.contains_key(&scheme.to_ascii_lowercase())
    }

    pub fn client_for(&self, announce: &str) -> Result<Box<dyn TrackerClient>> {
        self.client_for_url(&Url::parse(announce)?)
    }

    pub fn client_for_url(&self, url: &Url) -> Result<Box<dyn TrackerClient>> {
        let constructor = self
            .constructors
            .get(url.scheme())
            .ok_or_else(|| TrackerError::UnsupportedScheme(url.scheme().to_string()))?;
        constructor(url)
    }
}
