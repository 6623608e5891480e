//! A milter that prints callback arguments and macros for each stage.

use std::env;

use async_trait::async_trait;
use tokio::net::TcpListener;

use miltr_common::{
    actions::{Action, Continue},
    commands::{Connect, Header, Helo, Macro, Unknown},
    modifications::ModificationResponse,
    optneg::OptNeg,
};
use miltr_server::{Error, HeaderMap, Milter, Server};

struct PrintMilter;

#[async_trait]
impl Milter for PrintMilter {
    type Error = &'static str;

    async fn option_negotiation(&mut self, opt_neg: OptNeg) -> Result<OptNeg, Error<Self::Error>> {
        println!("\n======== NEGOTIATE ========");
        println!("  opts received: {opt_neg:#?}");
        let opts = OptNeg::default();
        println!("  opts sent back: {opts:#?}");
        Ok(opts)
    }

    async fn init(&mut self, session_id: &str, mail_id: &str) -> Result<(), Self::Error> {
        println!("\n======== INIT ========");
        println!("  session: {session_id}  mail: {mail_id}");
        Ok(())
    }

    async fn connect(&mut self, connect_info: Connect) -> Result<Action, Self::Error> {
        println!("\n======== CONNECT ========");
        println!("  hostname: {}", connect_info.hostname());
        println!(
            "  socket_info: {}:{:?}",
            connect_info.address(),
            connect_info.port
        );
        println!("  family: {:?}", connect_info.family);
        Ok(Continue.into())
    }

    async fn helo(&mut self, helo: Helo) -> Result<Action, Self::Error> {
        println!("\n======== HELO ========");
        println!("  hostname: {}", helo.helo());
        Ok(Continue.into())
    }

    async fn mail_from(&mut self, sender: &str) -> Result<Action, Self::Error> {
        println!("\n======== MAIL ========");
        println!("  sender: {sender}");
        Ok(Continue.into())
    }

    async fn rcpt_to(&mut self, recipient: &str) -> Result<Action, Self::Error> {
        println!("\n======== RCPT ========");
        println!("  recipient: {recipient}");
        Ok(Continue.into())
    }

    async fn header(&mut self, header: Header) -> Result<Action, Self::Error> {
        println!("\n======== HEADER ========");
        println!("  name: {}", header.name());
        println!("  value: {}", header.value());
        Ok(Continue.into())
    }

    async fn headers(&mut self, headers: &HeaderMap) -> Result<Action, Self::Error> {
        println!("\n======== EOH ========");
        println!("  accumulated: {} distinct names", headers.len());
        Ok(Continue.into())
    }

    async fn body_chunk(&mut self, chunk: &[u8]) -> Result<Action, Self::Error> {
        println!("\n======== BODY ========");
        println!("  body part: {}", String::from_utf8_lossy(chunk));
        Ok(Continue.into())
    }

    async fn body(&mut self) -> Result<ModificationResponse, Self::Error> {
        println!("\n======== END OF BODY ========");
        Ok(ModificationResponse::empty_continue())
    }

    async fn quit(&mut self) -> Result<(), Self::Error> {
        println!("\n======== QUIT ========");
        Ok(())
    }

    async fn quit_nc(&mut self) -> Result<(), Self::Error> {
        println!("\n======== QUIT NEXT CONNECTION ========");
        Ok(())
    }

    async fn unknown(&mut self, cmd: Unknown) -> Result<Action, Self::Error> {
        println!("\n======== UNKNOWN ========");
        println!("  Raw: {cmd:?}");
        Ok(Continue.into())
    }

    async fn macro_(&mut self, macro_: Macro) -> Result<(), Self::Error> {
        println!("\n======== MACRO ========");
        println!(
            "  code: {}",
            char::from_u32(u32::from(macro_.code)).unwrap_or('?')
        );
        for (key, value) in macro_.macros() {
            println!(
                "  macro - {}:{}",
                String::from_utf8_lossy(key),
                String::from_utf8_lossy(value)
            );
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let addr = env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to addr");
    println!("\n======== Bound to socket ========");

    let server = Server::new(listener, || PrintMilter);
    server.run().await.expect("accept loop failed");
}
