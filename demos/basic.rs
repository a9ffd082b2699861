//! Minimal conversation: spawn the CLI, send one prompt, print the reply.

use copilot_codes::{CopilotClient, CopilotClientOptions, MessageOptions, SessionConfig};

#[tokio::main]
async fn main() -> copilot_codes::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let client = CopilotClient::new(CopilotClientOptions::default());
    client.start().await?;

    let session = client.create_session(SessionConfig::default()).await?;
    let subscription = session.on(|event| {
        if let Some(delta) = event.delta_content() {
            print!("{}", delta);
        }
    });

    println!("Asking: What is the capital of France?\n");
    let reply = session
        .send_and_wait(MessageOptions::new("What is the capital of France?"), None)
        .await?;

    match reply {
        Some(event) => println!("\nAssistant: {}", event.content().unwrap_or("")),
        None => println!("\nSession went idle without an assistant message"),
    }

    subscription.unsubscribe();
    session.destroy().await?;
    client.stop().await?;
    Ok(())
}
