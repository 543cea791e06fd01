//! Fetches a URL a few ways.
//!
//! ```text
//! cargo run --example fetch -- http://httpbin.org
//! ```

use std::time::Instant;

use courier::interceptor::{Chain, interceptor_fn};
use courier::{Client, ClientBuilder, ClientConfig, Request, RequestBody, callback_fn};
use tokio::sync::oneshot;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let base = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://httpbin.org".to_string());
    let cfg = ClientConfig::load()?;

    let client: Client = ClientBuilder::from_config(&cfg)
        .add_interceptor(interceptor_fn(|chain: Chain| async move {
            let request = chain.request().clone();
            let started = Instant::now();
            let response = chain.proceed(request.clone()).await?;
            tracing::info!(
                %request,
                code = response.code(),
                elapsed = ?started.elapsed(),
                "Call finished"
            );
            Ok::<_, courier::Error>(response)
        }))
        .build();

    // Blocking-style GET
    let request = Request::builder().url(format!("{base}/get")).build()?;
    let response = client.new_call(request).execute().await?;
    let body = match response.body() {
        Some(body) => body.string().await?,
        None => String::new(),
    };
    println!("GET {} -> {}\n{}", response.request().url(), response.code(), body);

    // POST with a JSON body
    let request = Request::builder()
        .url(format!("{base}/post"))
        .post(RequestBody::json(r#"{"hello":"courier"}"#))
        .build()?;
    let response = client.new_call(request).execute().await?;
    println!("POST -> {} {}", response.code(), response.message());

    // Asynchronous call through the dispatcher
    let (tx, rx) = oneshot::channel();
    let request = Request::builder().url(format!("{base}/redirect/2")).build()?;
    client.new_call(request).enqueue(callback_fn(move |result| {
        let _ = tx.send(result);
    }))?;

    let response = rx.await??;
    println!(
        "async -> {} after {} redirect(s)",
        response.code(),
        response.prior_count()
    );

    Ok(())
}
