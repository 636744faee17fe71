use super::{HistoryStore, StoreError};
use imrelay_protocol::Message;
use std::collections::{BTreeSet, HashMap};

/// History kept in process memory only
#[derive(Debug, Default)]
pub struct MemoryStore {
    owner: Option<String>,
    private: HashMap<String, Vec<Message>>,
    group: Vec<Message>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl HistoryStore for MemoryStore {
    fn init_schema(&mut self, own_name: &str) -> Result<(), StoreError> {
        self.owner = Some(own_name.to_string());
        Ok(())
    }

    fn append_private_message(&mut self, peer: &str, msg: &Message) -> Result<(), StoreError> {
        self.private
            .entry(peer.to_string())
            .or_default()
            .push(msg.clone());
        Ok(())
    }

    fn append_group_message(&mut self, msg: &Message) -> Result<(), StoreError> {
        self.group.push(msg.clone());
        Ok(())
    }

    fn load_private_history(&self, peer: &str) -> Result<Vec<Message>, StoreError> {
        Ok(self.private.get(peer).cloned().unwrap_or_default())
    }

    fn load_group_history(&self) -> Result<Vec<Message>, StoreError> {
        Ok(self.group.clone())
    }

    fn list_known_names(&self) -> Result<BTreeSet<String>, StoreError> {
        let peers = self.private.keys().cloned();
        let senders = self.group.iter().map(|msg| msg.sender.clone());
        Ok(self.owner.iter().cloned().chain(peers).chain(senders).collect())
    }
}
