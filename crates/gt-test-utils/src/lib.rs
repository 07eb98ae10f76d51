// gt-test-utils: Shared test utilities for the gateway suite.
//
// Provides a line-oriented request/reply client for driving a gateway over
// a real TCP socket.

pub mod line_client;

pub use line_client::LineClient;

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_util::codec::{Framed, LinesCodec};

    /// Replies to every line with its uppercase form.
    async fn upper_echo_server() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut lines = Framed::new(stream, LinesCodec::new());
            while let Some(Ok(line)) = lines.next().await {
                if lines.send(line.to_uppercase()).await.is_err() {
                    break;
                }
            }
        });
        addr
    }

    #[tokio::test]
    async fn request_returns_one_reply_per_line() {
        let addr = upper_echo_server().await;
        let mut client = LineClient::connect(addr).await.unwrap();

        assert_eq!(client.request("hello").await.unwrap(), "HELLO");
        assert_eq!(client.request("again").await.unwrap(), "AGAIN");
    }

    #[tokio::test]
    async fn raw_bytes_are_sent_verbatim() {
        let addr = upper_echo_server().await;
        let mut client = LineClient::connect(addr).await.unwrap();

        client.send_raw(b"abc\n").await.unwrap();
        assert_eq!(client.recv().await.unwrap(), Some("ABC".to_owned()));
    }
}
