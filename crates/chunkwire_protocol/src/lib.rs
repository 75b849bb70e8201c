use std::fmt::Debug;

use num_enum::TryFromPrimitive;

pub mod channel;
pub mod frame;
pub mod packets;
pub mod snapshot;

use frame::{decode_body, decode_frame, encode_frame, FrameError};

pub trait IdentifiedPacket<I: Debug>: Debug {
    const ID: I;

    fn get_packet_id(&self) -> I;
}

/// Declares a packet id enum plus `IdentifiedPacket`/`encode` impls for each listed packet
/// type, and a `PacketHandler` trait with one `handle_*` method per packet (default no-op)
/// and a `parse_and_handle` dispatcher that decodes the outer frame, looks up the packet id,
/// and decodes the body into the matching type before calling the handler.
macro_rules! identify_packets {
    { $enum_name:ident, $( $packet:ident = $val:tt ),* $(,)? } => {
        #[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive)]
        #[repr(u16)]
        pub enum $enum_name {
            $( $packet = $val,)*
        }

        $(impl IdentifiedPacket<$enum_name> for $packet {
            const ID: $enum_name = $enum_name::$packet;

            fn get_packet_id(&self) -> $enum_name {
                Self::ID
            }
        })*

        $(impl $packet {
            pub fn encode(&self) -> Result<Vec<u8>, FrameError> {
                encode_frame($enum_name::$packet as u16, self)
            }
        })*

        pub trait PacketHandler {
            const DEBUG: bool = false;

            paste::paste! {
                $(
                    fn [<handle_ $packet:snake>](&mut self, _packet: $packet) -> anyhow::Result<()> {
                        Ok(())
                    }
                )*
            }

            fn parse_and_handle(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
                let frame = decode_frame(bytes)?;

                match $enum_name::try_from(frame.packet_id) {
                    Ok(packet_id) => match packet_id {
                        $(
                            $enum_name::$packet => {
                                let packet: $packet = decode_body(&frame.body)?;
                                if Self::DEBUG {
                                    tracing::debug!(?packet, "received packet");
                                }
                                paste::paste! {
                                    self.[<handle_ $packet:snake>](packet)
                                }
                            }
                        )*
                    },
                    Err(_) => {
                        anyhow::bail!("unknown packet id {}", frame.packet_id)
                    }
                }
            }
        }
    }
}

pub(crate) use identify_packets;
