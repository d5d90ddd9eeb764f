//! Replay command handler.
//!
//! Feeds a captured reply stream through the renderer exactly as the chat
//! loop would, then prints the final body and the action directive (as
//! JSON) if the reply carried one.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use bubble_core::render::{HtmlRenderer, MarkdownHtml};
use bubble_core::session::StreamSession;
use bubble_core::stream::StreamingMessageRenderer;
use tracing::debug;

pub fn run(file: &Path, html: bool) -> Result<()> {
    let contents = fs::read_to_string(file)
        .with_context(|| format!("read stream capture {}", file.display()))?;

    let markdown = MarkdownHtml;
    let renderer_impl = html.then_some(&markdown as &dyn HtmlRenderer);

    let mut session = StreamSession::default();
    let mut renderer = StreamingMessageRenderer::new(&mut session, renderer_impl);

    for (index, chunk) in split_chunks(&contents).enumerate() {
        let update = renderer
            .on_chunk(chunk)
            .with_context(|| format!("replay chunk {} of {}", index + 1, file.display()))?;
        debug!(chunk = index + 1, visible = %update.display_text, "Replayed chunk");
    }

    let result = renderer.finish();
    println!("{}", result.body.as_str());
    if let Some(action) = &result.action {
        println!(
            "{}",
            serde_json::to_string(action).context("serialize action directive")?
        );
    }
    Ok(())
}

/// Splits a capture into chunks at blank lines, keeping line terminators.
fn split_chunks(contents: &str) -> impl Iterator<Item = &str> {
    let mut rest = contents;
    std::iter::from_fn(move || {
        while !rest.is_empty() {
            let end = rest.find("\n\n").map_or(rest.len(), |pos| pos + 2);
            let (chunk, tail) = rest.split_at(end);
            rest = tail;
            if !chunk.trim().is_empty() {
                return Some(chunk);
            }
        }
        None
    })
}
