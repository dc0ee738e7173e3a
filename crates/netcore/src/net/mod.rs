mod codec;
mod connection;
mod dispatch;
pub mod handlers;
mod protocol;
mod reliable;
mod stats;
mod transport;

pub use codec::{ByteReader, ByteWriter, DecodeError, FrameDecoder};
pub use connection::{ConnectionManager, ConnectionState, Endpoint};
pub use dispatch::{HandlerContext, PacketDispatcher, PacketHandler};
pub use protocol::{
    Account, Action, CLIENT_VERSION, Chat, ChatStyle, Connect, ConnectAck, DEFAULT_PORT,
    DisconnectReason, HEADER_SIZE, ItemAction, MAX_PACKET_SIZE, NAME_LEN, PROTOCOL_VERSION,
    Packet, PacketHeader, PacketId, PlayerAppear, UserInfo, Walk, decode_direction,
    encode_coordinate, encode_direction, sequence_greater_than, wire_timestamp,
};
pub use reliable::{
    Acknowledgement, ReceiveTracker, ReliablePacket, ReliableSender, ReliableUpdate, RttEstimator,
};
pub use stats::{NetworkStats, StatsSnapshot};
pub use transport::{
    ChannelCloser, ChannelReader, ChannelWriter, DuplexChannel, FrameTransform, MemoryListener,
    MemoryPeer, MemoryTransport, Plaintext, TcpTransport, TransformFactory, Transport,
    plaintext_factory,
};
