/// Prometheus exposition for the worker process
use actix_web::{web, App, HttpResponse, HttpServer};
use prometheus::{Encoder, TextEncoder};

/// Render every metric on the default registry in text format
pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

/// Bind a server exposing only `GET /metrics`.
///
/// Signal handling is left to the caller, which stops the server through
/// its handle.
pub fn metrics_server(host: &str, port: u16) -> std::io::Result<actix_web::dev::Server> {
    Ok(HttpServer::new(|| App::new().route("/metrics", web::get().to(serve_metrics)))
        .workers(1)
        .disable_signals()
        .bind((host, port))?
        .run())
}
