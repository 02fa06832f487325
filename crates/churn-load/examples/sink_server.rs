use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;

/// Accepts connections and waits for the peer to close them. Stands in for
/// the real target when trying the load generator locally.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:2345".to_string());
    let listener = TcpListener::bind(&addr).await?;
    let open = Arc::new(AtomicUsize::new(0));
    let mut accepted: u64 = 0;

    println!("Sink listening on {}", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        accepted += 1;
        let open = Arc::clone(&open);
        let now_open = open.fetch_add(1, Ordering::SeqCst) + 1;

        if accepted % 100 == 0 {
            println!("[{}] accepted so far, {} open", accepted, now_open);
        }

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => println!("[{}] unexpected {} bytes", peer, n),
                    Err(e) => {
                        eprintln!("[{}] read error: {}", peer, e);
                        break;
                    }
                }
            }
            open.fetch_sub(1, Ordering::SeqCst);
        });
    }
}
