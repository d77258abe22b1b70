use std::sync::Arc;

use anyhow::{bail, Context, Result};
use axum::extract::{Request, State};
use axum::response::Response;
use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::InvokerConfig;
use crate::dispatch::Invoker;
use crate::fatal::{crash_and_exit, install_panic_hook, termination_signal};
use crate::function::Function;

/// Every method and path goes to the invoker.
pub fn router(invoker: Arc<Invoker>) -> Router {
    Router::new()
        .fallback(invoke)
        .with_state(invoker)
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
}

async fn invoke(State(invoker): State<Arc<Invoker>>, request: Request) -> Response {
    invoker.handle(request).await
}

/// Serve `function` until a process-fatal condition, then exit with
/// [`CRASH_EXIT_CODE`](crate::fatal::CRASH_EXIT_CODE).
pub async fn serve(config: &InvokerConfig, function: Function) -> Result<()> {
    if let Some(declared) = config.signature_type {
        if declared != function.signature() {
            bail!(
                "FUNCTION_SIGNATURE_TYPE is {declared} but {} is a {} function",
                config.target,
                function.signature()
            );
        }
    }

    let invoker = Arc::new(Invoker::new(function, config.invoke_options()));
    let in_flight = invoker.in_flight().clone();
    install_panic_hook(in_flight.clone());

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, function_target = %config.target, signature = %invoker.function().signature(), "serving function");

    let app = router(invoker);
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    let reason = tokio::select! {
        result = server => match result {
            Ok(Ok(())) => "server stopped".to_string(),
            Ok(Err(e)) => format!("server error: {e}"),
            Err(e) => format!("server task failed: {e}"),
        },
        signal = termination_signal() => format!("received {signal}"),
    };
    crash_and_exit(&in_flight, &reason).await;
    Ok(())
}
