//! A milter that upper-cases the body and appends a marker to the last header.

use std::env;

use async_trait::async_trait;
use tokio::net::TcpListener;

use miltr_common::{
    actions::{Action, Continue, Replycode},
    commands::Header,
    modifications::{body::ReplaceBody, headers::ChangeHeader, ModificationResponse},
};
use miltr_server::{HeaderMap, Milter, Server};

#[derive(Debug, Default)]
struct ModMilter {
    last_header: Option<Header>,
    body_parts: Vec<Vec<u8>>,
}

#[async_trait]
impl Milter for ModMilter {
    type Error = &'static str;

    async fn header(&mut self, header: Header) -> Result<Action, Self::Error> {
        self.last_header = Some(header);
        Ok(Continue.into())
    }

    async fn headers(&mut self, _headers: &HeaderMap) -> Result<Action, Self::Error> {
        Ok(Continue.into())
    }

    async fn body_chunk(&mut self, chunk: &[u8]) -> Result<Action, Self::Error> {
        self.body_parts.push(chunk.to_vec());
        Ok(Continue.into())
    }

    async fn body(&mut self) -> Result<ModificationResponse, Self::Error> {
        let mut builder = ModificationResponse::builder();

        if let Some(last_header) = &self.last_header {
            let new_value = format!("{} was changed", last_header.value());
            builder.push(ChangeHeader::new(
                1,
                last_header.name().as_bytes(),
                new_value.as_bytes(),
            ));
        }

        for body_part in self.body_parts.drain(..) {
            let upper = String::from_utf8_lossy(&body_part).to_uppercase();
            builder.push(ReplaceBody::from_iter(upper.as_bytes()));
        }

        Ok(builder.build(Replycode::new(250u16, "What a message!")))
    }
}

#[tokio::main]
async fn main() {
    let addr = env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to addr");
    println!("Bound to socket");

    let server = Server::new(listener, ModMilter::default);
    server.run().await.expect("accept loop failed");
}
