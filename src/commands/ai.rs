//! Chat and image generation commands.

use super::{is_allowed, respond, Command, EmbedReply, Invocation, Reply};
use crate::error::Result;
use crate::types::{Context, Data, Error};

pub(crate) async fn chat_reply(
    data: &Data,
    invocation: &Invocation,
    prompt: &str,
) -> Result<Reply> {
    if !is_allowed(&data.config.chat_allowed_users, invocation.user_id) {
        return Ok(Reply::Denied(
            "To conserve compute resources, only specific users can use chat.".to_string(),
        ));
    }
    let Some(chat) = &data.chat else {
        return Ok(Reply::UpstreamUnavailable("chat is not configured".to_string()));
    };

    let answer = chat.chat(invocation.user_id, Some(invocation.channel_id), prompt.trim()).await?;
    Ok(Reply::Text(answer))
}

pub(crate) async fn image_reply(
    data: &Data,
    invocation: &Invocation,
    prompt: &str,
) -> Result<Reply> {
    if !is_allowed(&data.config.image_allowed_users, invocation.user_id) {
        return Ok(Reply::Denied(
            "Image generation costs money. Contact the bot administrator for access.".to_string(),
        ));
    }
    let Some(image) = &data.image else {
        return Ok(Reply::UpstreamUnavailable("image generation is not configured".to_string()));
    };

    let prompt = prompt.trim();
    let generated = image.generate(invocation.user_id, Some(invocation.channel_id), prompt).await?;

    let mut description = format!("**Original Prompt:** {}", prompt);
    if let Some(revised) = &generated.revised_prompt {
        description.push_str(&format!("\n**Revised Prompt:** {}", revised));
    }

    Ok(EmbedReply::new("🎨 Generated Image")
        .description(crate::llm::truncate_reply(&description))
        .image(generated.url)
        .into())
}

pub(crate) async fn clear_chat_reply(data: &Data, invocation: &Invocation) -> Result<Reply> {
    if !is_allowed(&data.config.chat_allowed_users, invocation.user_id) {
        return Ok(Reply::Denied(
            "To conserve compute resources, only specific users can clear the chat.".to_string(),
        ));
    }
    let Some(chat) = &data.chat else {
        return Ok(Reply::UpstreamUnavailable("chat is not configured".to_string()));
    };

    chat.clear().await;
    tracing::info!(user_id = invocation.user_id, "Chat history cleared");
    Ok(Reply::Text("Chat history cleared! Starting fresh, dude! 🤙".to_string()))
}

/// Talk to the chat model.
#[poise::command(slash_command)]
pub async fn chat(
    context: Context<'_>,
    #[description = "What to say"]
    #[min_length = 1]
    #[max_length = 2000]
    prompt: String,
) -> std::result::Result<(), Error> {
    respond(context, Command::Chat { prompt }).await
}

/// Generate an image from a prompt.
#[poise::command(slash_command)]
pub async fn image(
    context: Context<'_>,
    #[description = "What to draw"]
    #[min_length = 1]
    #[max_length = 1000]
    prompt: String,
) -> std::result::Result<(), Error> {
    respond(context, Command::Image { prompt }).await
}

/// Forget the chat conversation and start over.
#[poise::command(slash_command, rename = "clear-chat")]
pub async fn clear_chat(context: Context<'_>) -> std::result::Result<(), Error> {
    respond(context, Command::ClearChat).await
}
