//! Several clients editing one pad through a reference server
//!
//! The server rebases each submission over the revisions committed since its
//! base, broadcasts it to the other clients and acknowledges it to the author.
//! Whatever the interleaving, every client must stay coherent and all of them
//! must end on the server text.

use padsync_core::sync::{OtState, Submission};
use padsync_core::{Changeset, Revision};
use proptest::prelude::*;
use std::collections::VecDeque;

const CLIENTS: usize = 3;
const INITIAL: &str = "hello world\n";

#[derive(Debug, Clone)]
enum Event {
    NewChanges(Changeset, Revision),
    Accept(Revision),
}

struct Client {
    ot: OtState,
    inbox: VecDeque<Event>,
}

struct Server {
    text: String,
    history: Vec<Changeset>,
    inbox: VecDeque<(usize, Submission)>,
}

struct Pad {
    server: Server,
    clients: Vec<Client>,
}

impl Pad {
    fn new() -> Self {
        Self {
            server: Server {
                text: INITIAL.to_string(),
                history: Vec::new(),
                inbox: VecDeque::new(),
            },
            clients: (0..CLIENTS)
                .map(|_| Client {
                    ot: OtState::new(INITIAL.to_string(), 0),
                    inbox: VecDeque::new(),
                })
                .collect(),
        }
    }

    /// Local edit that never touches the final newline
    fn edit(&mut self, client: usize, pos: usize, removed: usize, text: &str) {
        let ot = &mut self.clients[client].ot;
        let body = ot.client_len() - 1;
        let pos = pos % (body + 1);
        let removed = removed.min(body - pos);

        let cs = Changeset::simple_edit(ot.client_text(), pos, removed, text).unwrap();
        ot.apply_local(&cs).unwrap();
        ot.check_coherence().unwrap();
    }

    fn send(&mut self, client: usize) -> bool {
        match self.clients[client].ot.take_commit() {
            Some(submission) => {
                self.server.inbox.push_back((client, submission));
                true
            }
            None => false,
        }
    }

    fn serve(&mut self) -> bool {
        let Some((author, submission)) = self.server.inbox.pop_front() else {
            return false;
        };

        let mut cs = submission.changeset;
        for committed in &self.server.history[submission.base_rev as usize..] {
            cs = committed.follow(&cs, false).unwrap();
        }
        self.server.text = cs.apply_to_text(&self.server.text).unwrap();
        self.server.history.push(cs.clone());
        let rev = self.server.history.len() as Revision;

        for (i, client) in self.clients.iter_mut().enumerate() {
            let event = if i == author {
                Event::Accept(rev)
            } else {
                Event::NewChanges(cs.clone(), rev)
            };
            client.inbox.push_back(event);
        }
        true
    }

    fn deliver(&mut self, client: usize) -> bool {
        let client = &mut self.clients[client];
        let Some(event) = client.inbox.pop_front() else {
            return false;
        };

        match event {
            Event::NewChanges(cs, rev) => {
                client.ot.apply_remote(&cs, rev).unwrap();
            }
            Event::Accept(rev) => client.ot.apply_accept(rev).unwrap(),
        }
        client.ot.check_coherence().unwrap();
        true
    }

    fn settle(&mut self) {
        loop {
            let mut progress = false;
            for c in 0..CLIENTS {
                progress |= self.send(c);
            }
            while self.serve() {
                progress = true;
            }
            for c in 0..CLIENTS {
                while self.deliver(c) {
                    progress = true;
                }
            }
            if !progress {
                break;
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Step {
    Edit {
        client: usize,
        pos: usize,
        removed: usize,
        text: String,
    },
    Send(usize),
    Serve,
    Deliver(usize),
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (0..CLIENTS, any::<usize>(), 0usize..4, "[a-c\n]{0,3}").prop_map(
            |(client, pos, removed, text)| Step::Edit {
                client,
                pos,
                removed,
                text,
            }
        ),
        2 => (0..CLIENTS).prop_map(Step::Send),
        2 => Just(Step::Serve),
        3 => (0..CLIENTS).prop_map(Step::Deliver),
    ]
}

proptest! {
    #[test]
    fn prop_clients_converge(steps in prop::collection::vec(arb_step(), 1..60)) {
        let mut pad = Pad::new();

        for step in steps {
            match step {
                Step::Edit { client, pos, removed, text } => pad.edit(client, pos, removed, &text),
                Step::Send(c) => {
                    pad.send(c);
                }
                Step::Serve => {
                    pad.serve();
                }
                Step::Deliver(c) => {
                    pad.deliver(c);
                }
            }
        }
        pad.settle();

        let rev = pad.server.history.len() as Revision;
        for client in &pad.clients {
            prop_assert_eq!(client.ot.client_text(), pad.server.text.as_str());
            prop_assert_eq!(client.ot.server_rev(), rev);
            prop_assert_eq!(client.ot.client_rev(), Some(rev));
            prop_assert!(!client.ot.is_awaiting_ack());
            prop_assert!(!client.ot.is_send_pending());
        }
        prop_assert!(pad.server.text.ends_with('\n'));
    }
}

#[test]
fn test_concurrent_inserts_at_same_spot() {
    let mut pad = Pad::new();
    pad.edit(0, 5, 0, "X");
    pad.edit(1, 5, 0, "Y");

    // Client 0 wins the race to the server
    pad.send(0);
    pad.send(1);
    pad.settle();

    assert_eq!(pad.server.text, "helloXY world\n");
    for client in &pad.clients {
        assert_eq!(client.ot.client_text(), "helloXY world\n");
    }
}

#[test]
fn test_overlapping_deletes() {
    let mut pad = Pad::new();
    pad.edit(0, 0, 7, "");
    pad.edit(1, 4, 4, "");
    pad.settle();

    assert_eq!(pad.server.text, "rld\n");
    for client in &pad.clients {
        assert_eq!(client.ot.client_text(), "rld\n");
    }
}
