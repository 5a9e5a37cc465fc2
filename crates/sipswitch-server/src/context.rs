//! Wires every component crate into one `ServerContext` (spec §9 "replace
//! global manager singletons... with an explicit `ServerContext` value
//! passed down constructors"). Built once at startup from a
//! [`sipswitch_infra::ServerConfig`]; every dispatch task and lifecycle
//! component holds a clone of the `Arc`, never a live handle to a
//! listener or socket directly.
//!
//! This binary ships only the in-memory reference `UserStore` and
//! `RegistrationStore` (spec §6, SPEC_FULL ambient storage note); a
//! production deployment swaps `S`/`U` for durable collaborators without
//! the rest of this crate noticing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use sipswitch_auth::{DigestAuthenticator, InMemoryUserStore, NonceManager};
use sipswitch_infra::ServerConfig;
use sipswitch_proxy::ProxyEngine;
use sipswitch_registrar::{InMemoryRegistrationStore, RegistrarConfig, RegistrarManager};
use sipswitch_session::SessionManager;
use sipswitch_transaction::{TimerSettings, TransactionTable};
use sipswitch_transport::{TransportEvent, TransportManager};
use sipswitch_validation::{
    AuthenticationValidator, LoopDetectionValidator, MethodSupportValidator, SessionTimerValidator,
    SyntaxValidator, ValidatorChain,
};

use crate::error::Result;

/// Everything a dispatch task needs to process one message, grouped so
/// it can be cloned cheaply (every field is already `Arc`-backed) and
/// handed to a `tokio::spawn`ed task per message (spec §5 "per-message
/// work runs on a worker pool").
pub struct ServerContext {
    pub config: ServerConfig,
    pub transport: Arc<TransportManager>,
    pub transactions: Arc<TransactionTable>,
    pub registrar: Arc<RegistrarManager<InMemoryRegistrationStore>>,
    pub sessions: Arc<SessionManager>,
    pub proxy: ProxyEngine,
    pub validators: ValidatorChain,
    pub timer_settings: TimerSettings,
    /// This server's own `sent-by` (host:port), used to push/detect Via
    /// headers (spec §4.8 steps 2 and 4).
    pub sent_by: String,
}

impl ServerContext {
    /// Binds the transport listeners and constructs every method
    /// handler's backing store, returning the context plus the single
    /// merged transport event stream and the session-expiry event
    /// stream the server binary drives to completion.
    pub async fn build(
        config: ServerConfig,
    ) -> Result<(Arc<ServerContext>, mpsc::Receiver<TransportEvent>, mpsc::Receiver<sipswitch_session::SessionEvent>)> {
        let udp_addr: SocketAddr =
            format!("{}:{}", config.server.bind_address, config.server.udp_port).parse()?;
        let tcp_addr: SocketAddr =
            format!("{}:{}", config.server.bind_address, config.server.tcp_port).parse()?;

        let (transport, transport_events) =
            TransportManager::bind(udp_addr, tcp_addr, Some(Duration::from_secs(120))).await?;
        let transport = Arc::new(transport);

        let transactions = TransactionTable::new();
        let timer_settings = TimerSettings::default();

        let registration_store = Arc::new(InMemoryRegistrationStore::new());
        let registrar = RegistrarManager::new(
            registration_store.clone(),
            RegistrarConfig {
                min_expires: 60,
                max_expires: config.session_timer.max_se.max(3600),
                default_expires: config.session_timer.default_expires,
            },
        );

        let (sessions, session_events) = SessionManager::new();

        let sent_by = format!("{}:{}", local_advertised_host(&config), config.server.udp_port);

        let proxy = ProxyEngine::new(
            transport.clone(),
            transactions.clone(),
            registration_store.clone(),
            sent_by.clone(),
            timer_settings,
        );

        let user_store = Arc::new(InMemoryUserStore::new());
        let nonces = NonceManager::new(
            &config.authentication.realm,
            Duration::from_secs(config.authentication.nonce_expiry),
        );
        let authenticator = Arc::new(DigestAuthenticator::new(user_store, nonces));

        let validators = ValidatorChain::new(vec![
            Box::new(SyntaxValidator),
            Box::new(MethodSupportValidator),
            Box::new(LoopDetectionValidator),
            Box::new(SessionTimerValidator::new(
                config.session_timer.min_se,
                config.session_timer.max_se,
                config.session_timer.require_support,
            )),
            Box::new(AuthenticationValidator::with_require_auth(
                authenticator,
                config.authentication.require_auth,
            )),
        ]);

        let context = Arc::new(ServerContext {
            config,
            transport,
            transactions,
            registrar,
            sessions,
            proxy,
            validators,
            timer_settings,
            sent_by,
        });

        Ok((context, transport_events, session_events))
    }
}

/// `0.0.0.0` isn't a usable `sent-by` host for Via/loop-detection
/// purposes; fall back to `localhost` rather than advertise the unbound
/// address, matching how a deployment would normally set this from the
/// reachable interface instead.
fn local_advertised_host(config: &ServerConfig) -> &str {
    if config.server.bind_address == "0.0.0.0" || config.server.bind_address == "::" {
        "localhost"
    } else {
        &config.server.bind_address
    }
}
