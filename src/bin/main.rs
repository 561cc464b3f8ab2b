use guild_chat::events::ChatEvent;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("guild_chat=info")),
        )
        .init();

    guild_chat::config::ensure_config_dir();
    let client = guild_chat::create_client()?;
    if !client.session.is_authenticated() {
        anyhow::bail!(
            "no credential in {:?}; sign in through the web app first",
            client.session.path()
        );
    }

    let handles = client.start();
    let mut events = client.bus.subscribe();

    client.store.load_conversations().await?;
    let own_user = client.session.user().map(|u| u.id);
    for conv in client.store.conversations().await {
        println!(
            "#{:<6} {:<32} unread={}",
            conv.id,
            conv.display_title(own_user),
            conv.unread_count
        );
    }
    println!("unread badge: {}", client.unread.recompute().await.unwrap_or(0));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(ChatEvent::UnreadChanged(total)) => println!("unread badge: {total}"),
                Some(ChatEvent::SessionInvalid) => {
                    eprintln!("session expired, sign in again");
                    break;
                }
                Some(_) => {}
                None => break,
            },
        }
    }

    for handle in handles {
        handle.abort();
    }
    Ok(())
}
