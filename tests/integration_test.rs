use broadcast_chat::registry::{ConnectionRegistry, DuplicatePolicy, Outbound, CLOSE_REPLACED};
use broadcast_chat::ws::session::{Session, SessionState};
use std::sync::Arc;
use tokio::sync::mpsc;

struct Client {
    session: Session,
    rx: mpsc::UnboundedReceiver<Outbound>,
}

impl Client {
    async fn join(registry: &Arc<ConnectionRegistry>, username: &str) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut session = Session::new(registry.clone(), username, tx);
        session.open().await.expect("join should succeed");
        Self { session, rx }
    }

    /// Text frames queued so far
    fn inbox(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = self.rx.try_recv() {
            if let Outbound::Text(text) = msg {
                out.push(text);
            }
        }
        out
    }
}

/// Three users chat, one leaves, the rest keep chatting
#[tokio::test]
async fn test_chat_scenario() {
    let registry = Arc::new(ConnectionRegistry::default());
    let mut alice = Client::join(&registry, "alice").await;
    let mut bob = Client::join(&registry, "bob").await;
    let mut carol = Client::join(&registry, "carol").await;

    alice.session.on_text("hi").await.unwrap();

    assert_eq!(alice.inbox(), vec!["You wrote: hi"]);
    assert_eq!(bob.inbox(), vec!["username #alice says: hi"]);
    assert_eq!(carol.inbox(), vec!["username #alice says: hi"]);

    assert!(bob.session.close().await);
    assert_eq!(bob.session.state(), SessionState::Closed);

    assert_eq!(alice.inbox(), vec!["username #bob left the chat"]);
    assert_eq!(carol.inbox(), vec!["username #bob left the chat"]);

    // Closing again must not produce a second notice
    assert!(!bob.session.close().await);
    assert!(alice.inbox().is_empty());

    carol.session.on_text("bye bob").await.unwrap();
    assert_eq!(carol.inbox(), vec!["You wrote: bye bob"]);
    assert_eq!(alice.inbox(), vec!["username #carol says: bye bob"]);
    assert!(bob.inbox().is_empty());

    assert_eq!(registry.usernames().await, vec!["alice", "carol"]);
}

#[tokio::test]
async fn test_messages_from_one_sender_keep_order() {
    let registry = Arc::new(ConnectionRegistry::default());
    let alice = Client::join(&registry, "alice").await;
    let mut bob = Client::join(&registry, "bob").await;

    for text in ["one", "two", "three"] {
        alice.session.on_text(text).await.unwrap();
    }

    assert_eq!(
        bob.inbox(),
        vec![
            "username #alice says: one",
            "username #alice says: two",
            "username #alice says: three",
        ]
    );
}

#[tokio::test]
async fn test_empty_messages_are_relayed() {
    let registry = Arc::new(ConnectionRegistry::default());
    let mut alice = Client::join(&registry, "alice").await;
    let mut bob = Client::join(&registry, "bob").await;

    alice.session.on_text("").await.unwrap();
    alice.session.on_text("   ").await.unwrap();

    assert_eq!(alice.inbox(), vec!["You wrote: ", "You wrote:    "]);
    assert_eq!(
        bob.inbox(),
        vec!["username #alice says: ", "username #alice says:    "]
    );
}

#[tokio::test]
async fn test_dead_recipient_does_not_block_others() {
    let registry = Arc::new(ConnectionRegistry::default());
    let alice = Client::join(&registry, "alice").await;
    let Client { session: mut bob, rx: bob_rx } = Client::join(&registry, "bob").await;
    let mut carol = Client::join(&registry, "carol").await;

    // Bob's writer is gone but his handler has not noticed yet
    drop(bob_rx);

    alice.session.on_text("hello").await.unwrap();
    assert_eq!(carol.inbox(), vec!["username #alice says: hello"]);
    assert!(!registry.contains("bob").await);

    // When bob's handler does close, the others still learn he left
    assert!(bob.close().await);
    assert_eq!(carol.inbox(), vec!["username #bob left the chat"]);
}

#[tokio::test]
async fn test_duplicate_username_replaces_previous() {
    let registry = Arc::new(ConnectionRegistry::new(DuplicatePolicy::Replace));
    let mut bob = Client::join(&registry, "bob").await;
    let mut old = Client::join(&registry, "alice").await;
    let mut new = Client::join(&registry, "alice").await;

    assert!(matches!(
        old.rx.try_recv(),
        Ok(Outbound::Close { code, .. }) if code == CLOSE_REPLACED
    ));

    bob.session.on_text("who is there").await.unwrap();
    assert_eq!(new.inbox(), vec!["username #bob says: who is there"]);
    assert!(old.inbox().is_empty());

    // The displaced connection leaves without announcing anything
    assert!(!old.session.close().await);
    assert_eq!(bob.inbox(), vec!["You wrote: who is there"]);
    assert_eq!(registry.usernames().await, vec!["alice", "bob"]);
}

#[tokio::test]
async fn test_replaced_connection_closing_last_is_not_announced() {
    let registry = Arc::new(ConnectionRegistry::new(DuplicatePolicy::Replace));
    let mut bob = Client::join(&registry, "bob").await;
    let mut old = Client::join(&registry, "alice").await;
    let mut new = Client::join(&registry, "alice").await;

    assert!(new.session.close().await);
    assert!(!old.session.close().await);

    assert_eq!(bob.inbox(), vec!["username #alice left the chat"]);
    assert_eq!(registry.usernames().await, vec!["bob"]);
}

#[tokio::test]
async fn test_duplicate_username_rejected() {
    let registry = Arc::new(ConnectionRegistry::new(DuplicatePolicy::Reject));
    let mut alice = Client::join(&registry, "alice").await;

    let (tx, _rx) = mpsc::unbounded_channel();
    let mut impostor = Session::new(registry.clone(), "alice", tx);
    assert!(impostor.open().await.is_err());

    assert!(alice.inbox().is_empty());
    assert_eq!(registry.len().await, 1);

    // The original holder is unaffected
    alice.session.on_text("still me").await.unwrap();
    assert_eq!(alice.inbox(), vec!["You wrote: still me"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_senders() {
    const SENDERS: usize = 16;

    let registry = Arc::new(ConnectionRegistry::default());
    let mut listener = Client::join(&registry, "listener").await;

    let mut senders = Vec::new();
    for i in 0..SENDERS {
        senders.push(Client::join(&registry, &format!("user{}", i)).await);
    }

    let tasks: Vec<_> = senders
        .into_iter()
        .enumerate()
        .map(|(i, client)| {
            tokio::spawn(async move {
                client
                    .session
                    .on_text(&format!("message {}", i))
                    .await
                    .unwrap();
                client
            })
        })
        .collect();

    let mut senders = Vec::new();
    for task in tasks {
        senders.push(task.await.unwrap());
    }

    let mut received = listener.inbox();
    assert_eq!(received.len(), SENDERS);
    received.sort();
    received.dedup();
    assert_eq!(received.len(), SENDERS, "no duplicates");

    for (i, sender) in senders.iter_mut().enumerate() {
        let inbox = sender.inbox();
        let own = format!("username #user{} says: message {}", i, i);
        assert_eq!(inbox.len(), SENDERS, "one echo plus a relay from every other sender");
        assert!(inbox.contains(&format!("You wrote: message {}", i)));
        assert!(!inbox.contains(&own));
    }
}
