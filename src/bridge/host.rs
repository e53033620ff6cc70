//! Host editor channel: one JSON object per line.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::protocol::{HostCommand, HostEvent};

/// Forward commands read from `reader` until it ends.
///
/// End of input means the host is gone and is reported as
/// [`HostCommand::Shutdown`]. Lines that do not parse are skipped.
pub async fn read_commands<R>(reader: R, tx: mpsc::UnboundedSender<HostCommand>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match HostCommand::parse(line) {
                    Ok(cmd) => {
                        crate::debug!("host"; "<- {:?}", cmd);
                        if tx.send(cmd).is_err() {
                            return;
                        }
                    }
                    Err(e) => crate::debug!("host"; "ignoring `{}`: {}", line, e),
                }
            }
            Ok(None) => break,
            Err(e) => {
                crate::log!("host"; "read error: {}", e);
                break;
            }
        }
    }
    let _ = tx.send(HostCommand::Shutdown);
}

/// Write events to `writer` until every sender is dropped.
pub async fn write_events<W>(mut writer: W, mut rx: mpsc::UnboundedReceiver<HostEvent>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = rx.recv().await {
        let mut line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                crate::log!("host"; "cannot encode {:?}: {}", event, e);
                continue;
            }
        };
        line.push('\n');
        let written = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        };
        if let Err(e) = written.await {
            crate::log!("host"; "write error: {}", e);
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::HostSender;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_read_commands_skips_garbage_and_ends_with_shutdown() {
        let input: &[u8] = b"{\"cmd\":\"open\"}\n\nnot json\n{\"cmd\":\"intent\",\"source\":\"/a.md\"}\n";
        let (tx, mut rx) = mpsc::unbounded_channel();
        read_commands(input, tx).await;

        let mut commands = Vec::new();
        while let Some(cmd) = rx.recv().await {
            commands.push(cmd);
        }
        assert_eq!(
            commands,
            vec![
                HostCommand::Open,
                HostCommand::Intent {
                    source: Some(PathBuf::from("/a.md")),
                    preview_has_focus: false
                },
                HostCommand::Shutdown,
            ]
        );
    }

    #[tokio::test]
    async fn test_write_events_one_per_line() {
        let (host, rx) = HostSender::channel();
        host.send(HostEvent::RevealPanel);
        host.send(HostEvent::SetTitle {
            title: "Hello".into(),
        });
        drop(host);

        let mut out = Vec::new();
        write_events(&mut out, rx).await;
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "{\"event\":\"revealPanel\"}\n{\"event\":\"setTitle\",\"title\":\"Hello\"}\n"
        );
    }
}
