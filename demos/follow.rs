use log_tail::{TailMessage, TailOptions, TailRegistry};
use std::fs::OpenOptions;
use std::io::Write;
use std::time::Duration;
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dir = std::env::temp_dir().join("log-tail-demo");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("app.log");
    std::fs::write(&path, "boot\nconfig loaded\nlistening\n")?;

    let mut registry = TailRegistry::new(TailOptions::default().with_backlog_size(2))?;
    let mut first = registry.watch(&path).await?;
    let mut second = registry.watch(&path).await?;

    // Write from another task, as an external process would.
    let writer_path = path.clone();
    tokio::spawn(async move {
        for i in 0..3 {
            tokio::time::sleep(Duration::from_millis(200)).await;
            if let Ok(mut file) = OpenOptions::new().append(true).open(&writer_path) {
                let _ = writeln!(file, "request {}", i);
            }
        }
    });

    let mut count = 0;
    while let Some(message) = first.next().await {
        match &message {
            TailMessage::Snapshot { lines } => println!("Snapshot: {:?}", lines),
            TailMessage::Batch { lines } => println!("Batch #{}: {:?}", count + 1, lines),
            other => println!("Other: {:?}", other),
        }

        if matches!(message, TailMessage::Batch { .. }) {
            count += 1;
            if count >= 3 {
                break;
            }
        }
    }

    // The second observer saw the same messages in the same order.
    while let Ok(Some(message)) =
        tokio::time::timeout(Duration::from_millis(50), second.next()).await
    {
        println!("Second observer: {}", message.to_json()?);
    }

    registry.shutdown().await;
    Ok(())
}
