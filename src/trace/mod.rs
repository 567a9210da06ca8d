//! In-memory trace store.
//!
//! The store owns three append-only arenas (frames, conversations, files)
//! addressed by stable index handles, plus a secondary index that buckets
//! conversations by `src_port ^ dst_port`. The XOR key is symmetric in
//! direction, so a lookup finds the conversation no matter which way the
//! packet was travelling; implementations must preserve that property.
//!
//! Arena indices replace bidirectional object references: a conversation
//! holds the `FrameId`s of its frames in append order, and each frame holds
//! an optional `ConvId` back to its conversation.

mod conversation;
mod file;
mod frame;

use std::collections::HashMap;

use smallvec::SmallVec;

pub use conversation::{Conversation, ConversationKey};
pub use file::CaptureFile;
pub use frame::Frame;

macro_rules! arena_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(u32);

        impl $name {
            pub fn new(index: u32) -> Self {
                Self(index)
            }

            #[inline]
            pub fn index(self) -> u32 {
                self.0
            }
        }
    };
}

arena_id!(
    /// Stable handle to a frame in the trace store.
    FrameId
);
arena_id!(
    /// Stable handle to a conversation in the trace store.
    ConvId
);
arena_id!(
    /// Stable handle to a capture file in the trace store.
    FileId
);

/// Aggregate totals over a finished trace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceSummary {
    pub files: usize,
    pub frames: usize,
    pub conversations: usize,
    pub total_bytes: u64,
}

/// The mutable in-memory trace.
#[derive(Debug, Default)]
pub struct TraceStore {
    frames: Vec<Frame>,
    conversations: Vec<Conversation>,
    files: Vec<CaptureFile>,
    port_buckets: HashMap<u16, SmallVec<[ConvId; 4]>>,
}

impl TraceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-size the arenas from the total input bytes.
    ///
    /// Heuristics: one frame per `frame_bytes_hint` bytes, one conversation
    /// per `conversation_bytes_hint` bytes. Pure performance hint.
    pub fn reserve_for_input(&mut self, total_bytes: u64, frame_hint: u64, conv_hint: u64) {
        if frame_hint > 0 {
            self.frames.reserve((total_bytes / frame_hint) as usize);
        }
        if conv_hint > 0 {
            self.conversations
                .reserve((total_bytes / conv_hint) as usize);
        }
    }

    /// Register a capture file and return its handle.
    pub fn add_file(&mut self, file: CaptureFile) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(file);
        id
    }

    /// Append a decoded frame.
    ///
    /// Links the frame into its conversation's frame list (when attached)
    /// and updates the owning file's tick window and frame count.
    pub fn push_frame(&mut self, frame: Frame) -> FrameId {
        let id = FrameId(self.frames.len() as u32);
        if let Some(conv) = frame.conversation {
            self.conversations[conv.0 as usize].frames.push(id);
        }
        let file = &mut self.files[frame.file.0 as usize];
        file.frame_count += 1;
        if file.frame_count == 1 || frame.ticks < file.start_ticks {
            file.start_ticks = frame.ticks;
        }
        if frame.ticks > file.end_ticks {
            file.end_ticks = frame.ticks;
        }
        self.frames.push(frame);
        id
    }

    /// Find an existing conversation for a directional 5-tuple.
    ///
    /// The tuple is tried as given, then reversed. The returned flag is true
    /// when the as-given direction matches the conversation's client→server
    /// orientation.
    pub fn find_conversation(&self, key: &ConversationKey) -> Option<(ConvId, bool)> {
        let bucket = self.port_buckets.get(&key.bucket())?;
        let reversed = key.reversed();
        // Newest first, so a port-rollover successor shadows its predecessor.
        for &id in bucket.iter().rev() {
            let conv = &self.conversations[id.0 as usize];
            if conv.key == *key {
                return Some((id, true));
            }
            if conv.key == reversed {
                return Some((id, false));
            }
        }
        None
    }

    /// Create a conversation with the as-given direction as client→server.
    pub fn new_conversation(&mut self, key: ConversationKey, ticks: i64, next_protocol: u8) -> ConvId {
        let id = ConvId(self.conversations.len() as u32);
        self.conversations
            .push(Conversation::new(key, ticks, next_protocol));
        self.port_buckets.entry(key.bucket()).or_default().push(id);
        id
    }

    /// Start a replacement conversation on the same 5-tuple (TCP port reuse).
    ///
    /// The successor inherits the predecessor's key orientation and MACs and
    /// becomes the attach target for the triggering frame and everything
    /// after it; the predecessor keeps its historical frames.
    pub fn rollover_conversation(&mut self, prior: ConvId, ticks: i64) -> ConvId {
        let old = &self.conversations[prior.0 as usize];
        let key = old.key;
        let next_protocol = old.next_protocol;
        let (source_mac, dest_mac) = (old.source_mac, old.dest_mac);

        let id = ConvId(self.conversations.len() as u32);
        let mut conv = Conversation::new(key, ticks, next_protocol);
        conv.source_mac = source_mac;
        conv.dest_mac = dest_mac;
        self.conversations.push(conv);
        self.port_buckets.entry(key.bucket()).or_default().push(id);
        id
    }

    #[inline]
    pub fn frame(&self, id: FrameId) -> &Frame {
        &self.frames[id.0 as usize]
    }

    #[inline]
    pub fn frame_mut(&mut self, id: FrameId) -> &mut Frame {
        &mut self.frames[id.0 as usize]
    }

    #[inline]
    pub fn conversation(&self, id: ConvId) -> &Conversation {
        &self.conversations[id.0 as usize]
    }

    #[inline]
    pub fn conversation_mut(&mut self, id: ConvId) -> &mut Conversation {
        &mut self.conversations[id.0 as usize]
    }

    #[inline]
    pub fn file(&self, id: FileId) -> &CaptureFile {
        &self.files[id.0 as usize]
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn files(&self) -> &[CaptureFile] {
        &self.files
    }

    pub fn conversation_ids(&self) -> impl Iterator<Item = ConvId> {
        (0..self.conversations.len() as u32).map(ConvId)
    }

    pub fn summary(&self) -> TraceSummary {
        TraceSummary {
            files: self.files.len(),
            frames: self.frames.len(),
            conversations: self.conversations.len(),
            total_bytes: self.conversations.iter().map(|c| c.total_bytes).sum(),
        }
    }
}
