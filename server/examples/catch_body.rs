//! An example printing the complete milter conversation.
use std::env;

use async_trait::async_trait;
use miette::{IntoDiagnostic, Result, WrapErr};
use miltr_common::{
    actions::{Action, Continue},
    modifications::ModificationResponse,
    optneg::{Capability, OptNeg, Protocol},
};
use miltr_server::{Error, Milter, Server};
use tokio::net::TcpListener;

#[derive(Debug, Default)]
struct PrintBodyMilter {
    body_parts: Vec<Vec<u8>>,
}

#[async_trait]
impl Milter for PrintBodyMilter {
    type Error = &'static str;

    /// Option negotation tells the milter client what information this milter
    /// would like to get.
    async fn option_negotiation(&mut self, _: OptNeg) -> Result<OptNeg, Error<Self::Error>> {
        // In this example, we only need to receive the body.
        // So we let postfix know, we don't want to have all the other info.
        let protocol = Protocol::empty()
            | Protocol::NO_CONNECT
            | Protocol::NO_HELO
            | Protocol::NO_MAIL
            | Protocol::NO_RECIPIENT
            | Protocol::NO_HEADER
            | Protocol::NO_END_OF_HEADER;

        // The default includes all commands and capabilities
        let optneg = OptNeg {
            // But this example actually does not modify anything, it does not
            // have the 'Capabilites' to do so.
            capabilities: Capability::empty(),
            protocol,
            ..Default::default()
        };

        Ok(optneg)
    }

    /// This example errors on the rcpt command: Option negotiation told postfix
    /// to omit this command, this is just to demonstrate you can skip commands.
    async fn rcpt_to(&mut self, _: &str) -> Result<Action, Self::Error> {
        println!("This should not be printed as optneg said SMFIP_NORCPT");

        Err("Got unexpected command")
    }

    /// The body command might be received multiple times, so we push all the
    /// received chunks on a vec.
    async fn body_chunk(&mut self, chunk: &[u8]) -> Result<Action, Self::Error> {
        self.body_parts.push(chunk.to_vec());
        Ok(Continue.into())
    }

    /// End of body is the point in time we will have the most body parts
    /// captured.
    async fn body(&mut self) -> Result<ModificationResponse, Self::Error> {
        println!("\n======== END OF BODY ========");

        println!("Captured body:");
        println!("--------------");
        for part in &self.body_parts {
            println!("{}", String::from_utf8_lossy(part));
        }
        println!("--------------");

        self.body_parts.clear();

        Ok(ModificationResponse::empty_continue())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let addr = env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = TcpListener::bind(&addr)
        .await
        .into_diagnostic()
        .wrap_err("Failed to bind to addr")?;
    println!("Listening for milter connection");

    let server = Server::new(listener, PrintBodyMilter::default);
    server.run().await.into_diagnostic()?;
    Ok(())
}
