//! End-to-end tests over the public API.

use std::sync::Arc;

use liber_chat_crypto::crypto::{decrypt_message, encrypt_message};
use liber_chat_crypto::storage::keys;
use liber_chat_crypto::{
    ChatCryptoConfig, ChatCryptoSession, EncryptedPayload, Error, FileStore, KeyValueStore,
    MemoryStore,
};

fn fast_config() -> ChatCryptoConfig {
    ChatCryptoConfig::default().with_device_wrap_iterations(1_000)
}

#[tokio::test]
async fn test_conversation_both_directions() {
    let alice = ChatCryptoSession::in_memory(fast_config());
    let bob = ChatCryptoSession::in_memory(fast_config());

    let alice_pub = alice.my_public_key("alice").await.unwrap();
    let bob_pub = bob.my_public_key("bob").await.unwrap();

    let to_bob = alice.encrypt_for_peer("alice", &bob_pub, "hello").await.unwrap();
    assert_eq!(
        bob.decrypt_from_peer("bob", &alice_pub, &to_bob).await.unwrap(),
        "hello"
    );

    let to_alice = bob
        .encrypt_for_peer("bob", &alice_pub, "hi alice 👋")
        .await
        .unwrap();
    assert_eq!(
        alice.decrypt_from_peer("alice", &bob_pub, &to_alice).await.unwrap(),
        "hi alice 👋"
    );
}

#[tokio::test]
async fn test_payload_survives_json_transport() {
    let alice = ChatCryptoSession::in_memory(fast_config());
    let bob = ChatCryptoSession::in_memory(fast_config());
    let alice_pub = alice.my_public_key("alice").await.unwrap();
    let bob_pub = bob.my_public_key("bob").await.unwrap();

    let sent = alice.encrypt_for_peer("alice", &bob_pub, "over the wire").await.unwrap();
    let wire = serde_json::to_string(&sent).unwrap();
    let received: EncryptedPayload = serde_json::from_str(&wire).unwrap();

    assert_eq!(
        bob.decrypt_from_peer("bob", &alice_pub, &received).await.unwrap(),
        "over the wire"
    );
}

#[tokio::test]
async fn test_corrupted_hex_char_rejected() {
    let alice = ChatCryptoSession::in_memory(fast_config());
    let bob = ChatCryptoSession::in_memory(fast_config());
    let alice_pub = alice.my_public_key("alice").await.unwrap();
    let bob_pub = bob.my_public_key("bob").await.unwrap();

    let mut sent = alice.encrypt_for_peer("alice", &bob_pub, "hello").await.unwrap();
    let first = sent.data.remove(0);
    sent.data.insert(0, if first == '0' { '1' } else { '0' });

    assert!(matches!(
        bob.decrypt_from_peer("bob", &alice_pub, &sent).await,
        Err(Error::DecryptionFailed(_))
    ));
}

#[tokio::test]
async fn test_eavesdropper_cannot_decrypt() {
    let alice = ChatCryptoSession::in_memory(fast_config());
    let bob = ChatCryptoSession::in_memory(fast_config());
    let eve = ChatCryptoSession::in_memory(fast_config());

    let alice_pub = alice.my_public_key("alice").await.unwrap();
    let bob_pub = bob.my_public_key("bob").await.unwrap();

    let sent = alice.encrypt_for_peer("alice", &bob_pub, "secret").await.unwrap();

    assert!(eve.decrypt_from_peer("eve", &alice_pub, &sent).await.is_err());
}

#[tokio::test]
async fn test_identity_persists_across_file_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("profile").join("store.json");

    let first_pub = {
        let session = ChatCryptoSession::open_file(&path, fast_config()).await.unwrap();
        session.my_public_key("alice").await.unwrap()
    };

    let session = ChatCryptoSession::open_file(&path, fast_config()).await.unwrap();
    assert_eq!(session.my_public_key("alice").await.unwrap(), first_pub);
    assert!(session.private_key("alice").await.is_ok());

    // Nothing secret on disk in the clear
    let on_disk = std::fs::read_to_string(&path).unwrap();
    assert!(on_disk.contains("secure_chat_device_salt_v1"));
    assert!(!on_disk.contains("\"d\""));
}

#[tokio::test]
async fn test_messages_readable_after_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bob.json");

    let alice = ChatCryptoSession::in_memory(fast_config());
    let alice_pub = alice.my_public_key("alice").await.unwrap();

    let bob_pub = {
        let bob = ChatCryptoSession::open_file(&path, fast_config()).await.unwrap();
        bob.my_public_key("bob").await.unwrap()
    };
    let sent = alice.encrypt_for_peer("alice", &bob_pub, "still there?").await.unwrap();

    let bob = ChatCryptoSession::open_file(&path, fast_config()).await.unwrap();
    assert_eq!(
        bob.decrypt_from_peer("bob", &alice_pub, &sent).await.unwrap(),
        "still there?"
    );
}

#[tokio::test]
async fn test_concurrent_first_use_single_identity() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let session = Arc::new(ChatCryptoSession::new(Arc::clone(&store), fast_config()));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let session = Arc::clone(&session);
        handles.push(tokio::spawn(async move {
            session.my_public_key("alice").await
        }));
    }

    let mut seen = Vec::new();
    for handle in handles {
        seen.push(handle.await.unwrap().unwrap());
    }
    assert!(seen.windows(2).all(|w| w[0] == w[1]));
    assert!(store.contains(keys::DEVICE_SALT).await.unwrap());
}

#[tokio::test]
async fn test_two_sessions_share_one_device() {
    // Two tabs on one device: same store, separate sessions
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let tab_a = ChatCryptoSession::new(Arc::clone(&store), fast_config());
    let tab_b = ChatCryptoSession::new(Arc::clone(&store), fast_config());

    let (a, b) = tokio::join!(tab_a.my_public_key("alice"), tab_b.my_public_key("alice"));
    assert_eq!(a.unwrap(), b.unwrap());

    let peer = ChatCryptoSession::in_memory(fast_config());
    let peer_pub = peer.my_public_key("bob").await.unwrap();
    let alice_pub = tab_a.my_public_key("alice").await.unwrap();

    let sent = peer.encrypt_for_peer("bob", &alice_pub, "to both tabs").await.unwrap();
    assert_eq!(
        tab_b.decrypt_from_peer("alice", &peer_pub, &sent).await.unwrap(),
        "to both tabs"
    );
}

#[tokio::test]
async fn test_identity_lost_when_device_salt_changes() {
    let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
    let session = ChatCryptoSession::new(Arc::clone(&store), fast_config());
    session.my_public_key("alice").await.unwrap();

    store
        .set(keys::DEVICE_SALT, "00112233445566778899aabbccddeeff")
        .await
        .unwrap();

    let fresh = ChatCryptoSession::new(Arc::clone(&store), fast_config());
    let err = fresh.private_key("alice").await.unwrap_err();
    assert!(matches!(err, Error::IdentityUnavailable(_)));
    assert!(err.requires_user_action());
}

#[tokio::test]
async fn test_corrupt_file_store_not_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");
    std::fs::write(&path, "{ this is not json").unwrap();

    assert!(matches!(
        FileStore::open(&path).await,
        Err(Error::StorageReadError(_))
    ));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ this is not json");
}

#[test]
fn test_legacy_password_path() {
    let payload = encrypt_message("meet at noon", "correct horse").unwrap();

    assert_eq!(decrypt_message(&payload, "correct horse").unwrap(), "meet at noon");
    assert!(decrypt_message(&payload, "wrong horse").is_err());
}

#[tokio::test]
async fn test_two_file_sessions_share_one_identity() {
    // Two tabs opening the same profile file
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    let tab_a = ChatCryptoSession::open_file(&path, fast_config()).await.unwrap();
    let tab_b = ChatCryptoSession::open_file(&path, fast_config()).await.unwrap();

    let (a, b) = tokio::join!(tab_a.my_public_key("alice"), tab_b.my_public_key("alice"));
    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a, b);

    let reopened = ChatCryptoSession::open_file(&path, fast_config()).await.unwrap();
    assert_eq!(reopened.my_public_key("alice").await.unwrap(), a);
    assert!(reopened.private_key("alice").await.is_ok());
    assert!(tab_b.private_key("alice").await.is_ok());
}

#[tokio::test]
async fn test_device_salt_survives_second_file_handle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.json");

    let tab_a = FileStore::open(&path).await.unwrap();
    let tab_b = FileStore::open(&path).await.unwrap();

    let salt = tab_a
        .set_if_absent(keys::DEVICE_SALT, "00112233445566778899aabbccddeeff")
        .await
        .unwrap();
    tab_b.set("unrelated", "value").await.unwrap();
    assert_eq!(
        tab_b.set_if_absent(keys::DEVICE_SALT, "ffeeddccbbaa99887766554433221100").await.unwrap(),
        salt
    );

    let reopened = FileStore::open(&path).await.unwrap();
    assert_eq!(reopened.get(keys::DEVICE_SALT).await.unwrap(), Some(salt));
}
