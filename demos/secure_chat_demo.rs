//! # Secure Chat Demo
//!
//! Two devices establish identities, exchange public keys and trade an
//! encrypted message.
//!
//! ## Run
//!
//! ```bash
//! RUST_LOG=liber_chat_crypto=debug cargo run --example secure_chat_demo
//! ```

use liber_chat_crypto::{ChatCryptoConfig, ChatCryptoSession, EcdhPublicKey};

#[tokio::main]
async fn main() -> liber_chat_crypto::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "liber_chat_crypto=info".into()),
        )
        .init();

    println!("=== Liber Chat Crypto v{} ===\n", liber_chat_crypto::version());

    // Step 1: Each device loads or creates its identity
    println!("Step 1: Creating device identities...");
    let alice = ChatCryptoSession::in_memory(ChatCryptoConfig::default());
    let bob = ChatCryptoSession::in_memory(ChatCryptoConfig::default());

    let alice_pub = alice.my_public_key("alice").await?;
    let bob_pub = bob.my_public_key("bob").await?;

    println!("  Alice's fingerprint: {}", alice_pub.fingerprint()?);
    println!("  Bob's fingerprint:   {}", bob_pub.fingerprint()?);
    println!();

    // Step 2: Public keys travel through signaling as JWK
    println!("Step 2: Exchanging public keys (JWK)...");
    println!("  {}", alice_pub.to_json()?);
    let alice_seen_by_bob = EcdhPublicKey::from_jwk(&alice_pub)?;
    println!("  Bob imported Alice's key: {}", alice_seen_by_bob.fingerprint());
    println!();

    // Step 3: Both sides derive the same conversation key
    println!("Step 3: Deriving conversation keys (ECDH + HKDF)...");
    let k_alice = alice.shared_key("alice", &bob_pub).await?;
    let k_bob = bob.shared_key("bob", &alice_pub).await?;
    println!("  Keys match: {}", k_alice == k_bob);
    println!();

    // Step 4: Encrypt, transmit, decrypt
    println!("Step 4: Sending an encrypted message...");
    let payload = alice.encrypt_for_peer("alice", &bob_pub, "hello").await?;
    println!("  On the wire: {}", serde_json::to_string(&payload)?);

    let plaintext = bob.decrypt_from_peer("bob", &alice_pub, &payload).await?;
    println!("  Bob reads:   {}", plaintext);
    println!();

    // Step 5: Tampering is detected
    println!("Step 5: Tampering with the ciphertext...");
    let mut tampered = payload.clone();
    tampered.data.replace_range(0..2, if &tampered.data[0..2] == "00" { "ff" } else { "00" });
    match bob.decrypt_from_peer("bob", &alice_pub, &tampered).await {
        Ok(_) => println!("  Unexpected: tampered message decrypted"),
        Err(e) => println!("  Rejected: {} (code {})", e, e.code()),
    }

    println!("\n=== Demo complete ===");
    Ok(())
}
