mod utils;

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use miltr_common::{
    actions::{Action, Continue, Skip},
    commands::{Connect, Family, Header},
    decoding::ServerCommand,
    modifications::{headers::AddHeader, ModificationResponse},
    optneg::{Capability, OptNeg, Protocol},
};
use miltr_server::{HeaderMap, Milter};
use utils::MtaSim;

/// A milter recording the order stages were called in, for assertions about
/// control flow rather than content.
#[derive(Debug, Default, Clone)]
struct RecordingMilter {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingMilter {
    fn record(&self, event: impl Into<String>) {
        self.events.lock().expect("poisoned").push(event.into());
    }

    fn events(&self) -> Vec<String> {
        self.events.lock().expect("poisoned").clone()
    }
}

#[async_trait]
impl Milter for RecordingMilter {
    type Error = std::convert::Infallible;

    async fn init(&mut self, _session_id: &str, _mail_id: &str) -> Result<(), Self::Error> {
        self.record("init");
        Ok(())
    }

    async fn connect(&mut self, _connect_info: Connect) -> Result<Action, Self::Error> {
        self.record("connect");
        Ok(Continue.into())
    }

    async fn mail_from(&mut self, sender: &str) -> Result<Action, Self::Error> {
        self.record(format!("mail_from:{sender}"));
        Ok(Continue.into())
    }

    async fn rcpt_to(&mut self, recipient: &str) -> Result<Action, Self::Error> {
        self.record(format!("rcpt_to:{recipient}"));
        Ok(Continue.into())
    }

    async fn headers(&mut self, headers: &HeaderMap) -> Result<Action, Self::Error> {
        self.record(format!("headers:{}", headers.len()));
        Ok(Continue.into())
    }

    async fn body(&mut self) -> Result<ModificationResponse, Self::Error> {
        self.record("body");
        Ok(ModificationResponse::empty_continue())
    }

    async fn quit(&mut self) -> Result<(), Self::Error> {
        self.record("quit");
        Ok(())
    }
}

fn connect_v4() -> Connect {
    Connect::new(b"mail.example.com", Family::Inet, Some(25), b"192.0.2.10")
}

#[tokio::test]
async fn happy_path_runs_every_stage_in_order() {
    let milter = RecordingMilter::default();
    let events = milter.events.clone();
    let (mut mta, handle) = MtaSim::spawn(milter);

    mta.send(&OptNeg::default()).await;
    assert!(matches!(mta.recv().await, ServerCommand::OptNeg(_)));

    mta.send(&connect_v4()).await;
    assert!(matches!(mta.recv().await, ServerCommand::Continue(_)));

    mta.send(&miltr_common::commands::Mail::from(&b"sender@example.com"[..]))
        .await;
    assert!(matches!(mta.recv().await, ServerCommand::Continue(_)));

    mta.send(&Header::new(b"Subject", b"hello"))
        .await;
    assert!(matches!(mta.recv().await, ServerCommand::Continue(_)));

    mta.send(&miltr_common::commands::EndOfHeader).await;
    assert!(matches!(mta.recv().await, ServerCommand::Continue(_)));

    mta.send(&miltr_common::commands::EndOfBody).await;
    assert!(matches!(mta.recv().await, ServerCommand::Continue(_)));

    mta.send(&miltr_common::actions::Quit).await;
    mta.close().await;

    handle.await.expect("task panicked").expect("session errored");

    let seen = events.lock().expect("poisoned").clone();
    assert_eq!(
        seen,
        vec![
            "init",
            "connect",
            "mail_from:sender@example.com",
            "headers:1",
            "body",
            "quit",
        ]
    );
}

#[tokio::test]
async fn abort_resets_per_mail_state_without_a_response_frame() {
    let milter = RecordingMilter::default();
    let (mut mta, handle) = MtaSim::spawn(milter.clone());

    mta.send(&OptNeg::default()).await;
    let _ = mta.recv().await;

    mta.send(&miltr_common::commands::Mail::from(&b"a@example.com"[..]))
        .await;
    let _ = mta.recv().await;

    // Abort never gets a response frame; immediately follow up with a second
    // MAIL to prove the connection is still alive.
    mta.send(&miltr_common::actions::Abort).await;

    mta.send(&miltr_common::commands::Mail::from(&b"b@example.com"[..]))
        .await;
    assert!(matches!(mta.recv().await, ServerCommand::Continue(_)));

    mta.send(&miltr_common::actions::Quit).await;
    mta.close().await;
    handle.await.expect("task panicked").expect("session errored");

    let seen = milter.events();
    assert_eq!(
        seen,
        vec![
            "init",
            "mail_from:a@example.com",
            "init",
            "mail_from:b@example.com",
            "quit",
        ]
    );
}

/// A milter that always requests an `AddHeader` modification at end of mail.
#[derive(Debug, Default)]
struct AddHeaderMilter;

#[async_trait]
impl Milter for AddHeaderMilter {
    type Error = std::convert::Infallible;

    async fn body(&mut self) -> Result<ModificationResponse, Self::Error> {
        let mut builder = ModificationResponse::builder();
        builder.push(AddHeader::new(b"X-Milter", b"seen"));
        Ok(builder.contin())
    }
}

#[tokio::test]
async fn end_of_mail_modifications_are_sent_before_the_final_action() {
    let (mut mta, handle) = MtaSim::spawn(AddHeaderMilter);

    mta.send(&OptNeg::default()).await;
    let _ = mta.recv().await;

    mta.send(&miltr_common::commands::EndOfBody).await;
    let modification = mta.recv().await;
    assert!(matches!(modification, ServerCommand::AddHeader(_)));

    let final_action = mta.recv().await;
    assert!(matches!(final_action, ServerCommand::Continue(_)));

    mta.send(&miltr_common::actions::Quit).await;
    mta.close().await;
    handle.await.expect("task panicked").expect("session errored");
}

/// A milter that advertises `NR_MAIL` in its own option-negotiation reply,
/// so the negotiated protocol actually carries the bit (the default
/// `Milter::option_negotiation` never does, since it starts from
/// `Protocol::empty()` and ANDs with whatever the MTA offers).
#[derive(Debug, Default, Clone)]
struct NrMailMilter {
    events: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Milter for NrMailMilter {
    type Error = std::convert::Infallible;

    async fn option_negotiation(
        &mut self,
        theirs: OptNeg,
    ) -> Result<OptNeg, miltr_server::Error<Self::Error>> {
        let ours = OptNeg {
            protocol: Protocol::NR_MAIL,
            ..OptNeg::default()
        };
        let ours = ours
            .merge_compatible(&theirs)
            .map_err(miltr_common::ProtocolError::CompatibilityError)?;
        Ok(ours)
    }

    async fn mail_from(&mut self, sender: &str) -> Result<Action, Self::Error> {
        self.events
            .lock()
            .expect("poisoned")
            .push(format!("mail_from:{sender}"));
        Ok(Continue.into())
    }
}

#[tokio::test]
async fn negotiated_no_reply_suppresses_the_response_frame() {
    let milter = NrMailMilter::default();
    let events = milter.events.clone();
    let (mut mta, handle) = MtaSim::spawn(milter);

    let theirs = OptNeg {
        protocol: Protocol::NR_MAIL,
        ..OptNeg::default()
    };
    mta.send(&theirs).await;
    let ServerCommand::OptNeg(negotiated) = mta.recv().await else {
        panic!("expected OptNeg response");
    };
    assert!(negotiated.protocol.contains(Protocol::NR_MAIL));

    mta.send(&miltr_common::commands::Mail::from(&b"a@example.com"[..]))
        .await;

    // No response is expected for MAIL; the next frame read is the answer to
    // the following command instead. If suppression were broken, this would
    // instead receive the (suppressed) answer to MAIL.
    mta.send(&miltr_common::commands::EndOfBody).await;
    assert!(matches!(mta.recv().await, ServerCommand::Continue(_)));

    mta.send(&miltr_common::actions::Quit).await;
    mta.close().await;
    handle.await.expect("task panicked").expect("session errored");

    // The handler still ran for MAIL; only the wire response was suppressed.
    assert_eq!(
        events.lock().expect("poisoned").clone(),
        vec!["mail_from:a@example.com"]
    );
}

#[tokio::test]
async fn connect_accepts_ipv6_addresses() {
    let milter = RecordingMilter::default();
    let events = milter.events.clone();
    let (mut mta, handle) = MtaSim::spawn(milter);

    mta.send(&OptNeg::default()).await;
    let _ = mta.recv().await;

    let connect = Connect::new(b"mail.example.com", Family::Inet6, Some(25), b"2001:db8::1");
    mta.send(&connect).await;
    assert!(matches!(mta.recv().await, ServerCommand::Continue(_)));

    mta.send(&miltr_common::actions::Quit).await;
    mta.close().await;
    handle.await.expect("task panicked").expect("session errored");

    assert!(events.lock().expect("poisoned").contains(&"connect".to_string()));
}

/// A milter that always tries to skip the remainder of the body.
#[derive(Debug, Default)]
struct SkipMilter;

#[async_trait]
impl Milter for SkipMilter {
    type Error = std::convert::Infallible;

    async fn body_chunk(&mut self, _chunk: &[u8]) -> Result<Action, Self::Error> {
        Ok(Skip.into())
    }
}

#[tokio::test]
async fn skip_is_downgraded_to_continue_without_negotiated_support() {
    let (mut mta, handle) = MtaSim::spawn(SkipMilter);

    // Negotiate without SMFIP_SKIP.
    mta.send(&OptNeg::default()).await;
    let _ = mta.recv().await;

    mta.send(&miltr_common::commands::Body::from(&b"body bytes"[..]))
        .await;
    assert!(matches!(mta.recv().await, ServerCommand::Continue(_)));

    mta.send(&miltr_common::actions::Quit).await;
    mta.close().await;
    handle.await.expect("task panicked").expect("session errored");
}

#[tokio::test]
async fn skip_is_honored_once_negotiated() {
    let (mut mta, handle) = MtaSim::spawn(SkipMilter);

    let theirs = OptNeg {
        protocol: Protocol::SMFIP_SKIP,
        capabilities: Capability::all(),
        ..OptNeg::default()
    };
    mta.send(&theirs).await;
    let ServerCommand::OptNeg(negotiated) = mta.recv().await else {
        panic!("expected OptNeg response");
    };
    assert!(negotiated.protocol.contains(Protocol::SMFIP_SKIP));

    mta.send(&miltr_common::commands::Body::from(&b"body bytes"[..]))
        .await;
    assert!(matches!(mta.recv().await, ServerCommand::Skip(_)));

    mta.send(&miltr_common::actions::Quit).await;
    mta.close().await;
    handle.await.expect("task panicked").expect("session errored");
}
