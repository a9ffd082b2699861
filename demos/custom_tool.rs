//! Expose a custom tool and a permission handler to the assistant.

use copilot_codes::{
    CopilotClient, CopilotClientOptions, MessageOptions, PermissionRequestResult, SessionConfig,
    Tool,
};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> copilot_codes::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let weather_tool = Tool::new(
        "get_weather",
        "Returns the current weather for a city",
        |invocation| async move {
            let city = invocation.arguments["city"].as_str().unwrap_or("somewhere");
            Ok(json!(format!("It is 21 degrees and sunny in {}.", city)))
        },
    )
    .with_parameters(json!({
        "type": "object",
        "properties": {
            "city": {"type": "string", "description": "City to look up"}
        },
        "required": ["city"]
    }));

    let client = CopilotClient::new(CopilotClientOptions::default());
    client.start().await?;

    let session = client
        .create_session(SessionConfig {
            tools: vec![weather_tool],
            on_permission_request: Some(Arc::new(|request, _invocation| {
                Box::pin(async move {
                    println!("permission requested: kind={}", request.kind);
                    Ok(PermissionRequestResult::approved())
                })
            })),
            ..Default::default()
        })
        .await?;

    let reply = session
        .send_and_wait(
            MessageOptions::new("What's the weather in Paris? Use the get_weather tool."),
            None,
        )
        .await?;

    if let Some(event) = reply {
        println!("Assistant: {}", event.content().unwrap_or(""));
    }

    session.destroy().await?;
    client.stop().await?;
    Ok(())
}
