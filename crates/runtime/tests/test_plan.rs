use anyhow::Result;
use chatify_chats::entities::{MembershipStatus, NewMessage};
use chatify_chats::{MembershipRepository, MessageRepository};
use chatify_config::ClientConfig;
use chatify_runtime::{client, init_client, ClientServices, MEMORY_BACKEND_URL};

fn memory_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.backend.url = MEMORY_BACKEND_URL.to_string();
    config.session.user_id = Some("me".to_string());
    config
}

#[tokio::test]
async fn initialise_memory_backend_wires_every_port() -> Result<()> {
    let services = ClientServices::initialise(&memory_config())?;
    let memory = services.memory.clone().expect("memory backend expected");
    memory
        .add_conversation(
            "c1",
            &[("me", MembershipStatus::Accepted), ("you", MembershipStatus::Accepted)],
        )
        .await;

    services
        .backend
        .messages
        .insert(NewMessage::text("c1", "me", "hi"))
        .await?;
    assert_eq!(services.backend.messages.history("c1").await?.len(), 1);
    assert_eq!(services.backend.memberships.memberships("c1").await?.len(), 2);
    assert_eq!(services.user_id()?, "me");
    Ok(())
}

#[test]
fn initialise_remote_backend_without_network() -> Result<()> {
    let mut config = ClientConfig::default();
    config.backend.url = "http://127.0.0.1:9".to_string();

    let services = ClientServices::initialise(&config)?;
    assert!(services.memory.is_none());
    assert!(services.user_id().is_err());
    Ok(())
}

#[test]
fn init_client_keeps_the_first_instance() -> Result<()> {
    let first = init_client(&memory_config())?;

    let mut other = memory_config();
    other.session.user_id = Some("someone-else".to_string());
    let second = init_client(&other)?;

    assert!(std::ptr::eq(first, second));
    assert_eq!(client().map(|c| c.user_id().ok()), Some(Some("me")));
    Ok(())
}
