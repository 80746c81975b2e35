mod records;
mod wire;

pub use records::{
    CreationAttrs, ExecRecord, MessageCancel, MessageGet, MessageReply, MessageSend,
    MessageSendReceive, MessageSource, OpCode, QueueClose, QueueGroupCreate, QueueGroupDelete,
    QueueGroupInsert, QueueGroupRemove, QueueGroupTrack, QueueGroupTrackStop, QueueOpen,
    QueueStatusGet, QueueUnlink, MSG_SERVICE,
};
pub use wire::{byteswap_in_place, decode_from_wire, encode_to_wire, Header, HEADER_LEN};
