//! Rate command handler.

use anyhow::{Context, Result};
use bubble_core::config::Config;
use bubble_core::session::SessionStore;
use bubble_core::WidgetClient;

pub async fn run(config: &Config, rating: u8, session: Option<String>) -> Result<()> {
    let api_key = config.require_api_key()?;
    let client = WidgetClient::new(config.api_base_url()?, api_key);

    let mut store = SessionStore::open().context("open session state")?;
    let session_id = session.or_else(|| store.session_id(api_key).map(str::to_string));

    let message = client
        .submit_rating(rating, session_id.as_deref())
        .await
        .context("submit rating")?;

    if let Some(id) = session_id.as_deref() {
        store
            .mark_rating_shown(api_key, id)
            .context("update session state")?;
    }

    if message.is_empty() {
        println!("Rating submitted.");
    } else {
        println!("Rating submitted: {message}");
    }
    Ok(())
}
