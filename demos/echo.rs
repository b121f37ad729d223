//! Echo service - register a handler and dispatch through the router.
//!
//! This demo shows:
//! - Building a router with the builder pattern
//! - Feeding requests through the dispatcher task, as a transport would
//! - The error a caller sees for an unknown destination
//!
//! ```text
//! RUST_LOG=ipc_router=debug cargo run --example echo
//! ```

use std::sync::Arc;

use ipc_router::dispatch::spawn_dispatcher;
use ipc_router::{logging, Message, RequestContext, Router, RouterConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = RouterConfig::default();
    logging::init(&config.log_filter)?;

    let router = Arc::new(
        Router::builder()
            .config(config.clone())
            // Reply with the same payload, tagged with the caller
            .handle("echo", |ctx: RequestContext, msg: Message| async move {
                let caller = ctx.client_id().unwrap_or("anonymous").to_string();
                let mut body = format!("{caller}: ").into_bytes();
                body.extend_from_slice(msg.as_bytes());
                Ok(Some(Message::from(body)))
            })
            .build()?,
    );

    let (sender, dispatcher) = spawn_dispatcher(router.clone(), config.request_channel_capacity);

    let ctx = RequestContext::new(1).with_client_id("demo-client");
    if let Some(reply) = sender.call("echo", ctx, Message::from_static(b"hello")).await? {
        println!("{}", String::from_utf8_lossy(reply.as_bytes()));
    }

    match sender
        .call("missing", RequestContext::new(2), Message::empty())
        .await
    {
        Ok(_) => println!("unexpected reply"),
        Err(e) => println!("error: {e}"),
    }

    drop(sender);
    dispatcher.await?;
    router.shutdown().await;

    Ok(())
}
