//! Optional Sentry error tracking integration.
//!
//! Initializes the Sentry SDK with the provided DSN and environment.
//! The returned guard must be held for the lifetime of the application
//! so that panics and `error!` events (failed dials, runner accept
//! errors) are reported. Events reach Sentry through the
//! `sentry-tracing` layer installed by [`crate::logging::init`].

pub fn init(dsn: &str, environment: Option<&str>) -> sentry::ClientInitGuard {
    let parsed_dsn = match dsn.parse() {
        Ok(d) => Some(d),
        Err(e) => {
            tracing::warn!(error = %e, "invalid Sentry DSN, error tracking disabled");
            None
        }
    };

    let guard = sentry::init(sentry::ClientOptions {
        dsn: parsed_dsn,
        environment: environment.map(|e| e.to_string().into()),
        release: Some(env!("CARGO_PKG_VERSION").into()),
        attach_stacktrace: true,
        ..Default::default()
    });

    sentry::configure_scope(|scope| scope.set_tag("service", "switchboard"));
    guard
}
