//! # JSON <-> Protobuf Codec
//!
//! This module implements `tonic::codec::Codec` to enable `tonic` to transport `serde_json::Value`
//! directly, bypassing the need for generated Rust structs.
//!
//! The same codec serves both sides of a call; only the direction of the descriptors changes:
//!
//! | Side   | Encodes         | Decodes         |
//! |--------|-----------------|-----------------|
//! | Client | method input    | method output   |
//! | Server | method output   | method input    |
//!
//! 1. **Encoder (JSON -> Proto)**:
//!    - Takes a `serde_json::Value`.
//!    - Uses `prost_reflect::DynamicMessage` to validate the JSON against the `MessageDescriptor`.
//!    - Serializes the valid message into the generic gRPC byte buffer.
//!
//! 2. **Decoder (Proto -> JSON)**:
//!    - Reads raw bytes from the wire.
//!    - Decodes them into a `DynamicMessage`.
//!    - Converts the message into a `serde_json::Value` following the [`LoaderOptions`].
use crate::options::LoaderOptions;
use prost::Message;
use prost_reflect::{DynamicMessage, MessageDescriptor, MethodDescriptor};
use tonic::{
    Status,
    codec::{Codec, DecodeBuf, Decoder, EncodeBuf, Encoder},
};

/// A custom Codec that bridges `serde_json::Value` and Protobuf binary format.
pub struct JsonCodec {
    /// Schema for the outgoing message.
    encode_desc: MessageDescriptor,
    /// Schema for the incoming message.
    decode_desc: MessageDescriptor,
    options: LoaderOptions,
}

impl JsonCodec {
    /// Creates a new `JsonCodec`.
    ///
    /// # Arguments
    /// * `encode_desc` - Descriptor for the messages this side sends.
    /// * `decode_desc` - Descriptor for the messages this side receives.
    /// * `options` - Representation of the decoded JSON.
    pub fn new(
        encode_desc: MessageDescriptor,
        decode_desc: MessageDescriptor,
        options: LoaderOptions,
    ) -> Self {
        Self {
            encode_desc,
            decode_desc,
            options,
        }
    }

    /// Codec for the calling side of `method`.
    pub fn for_client(method: &MethodDescriptor, options: LoaderOptions) -> Self {
        Self::new(method.input(), method.output(), options)
    }

    /// Codec for the serving side of `method`.
    pub fn for_server(method: &MethodDescriptor, options: LoaderOptions) -> Self {
        Self::new(method.output(), method.input(), options)
    }
}

impl Codec for JsonCodec {
    type Encode = serde_json::Value;
    type Decode = serde_json::Value;

    type Encoder = JsonEncoder;
    type Decoder = JsonDecoder;

    fn encoder(&mut self) -> Self::Encoder {
        JsonEncoder {
            descriptor: self.encode_desc.clone(),
            options: self.options,
        }
    }

    fn decoder(&mut self) -> Self::Decoder {
        JsonDecoder {
            descriptor: self.decode_desc.clone(),
            options: self.options,
        }
    }
}

/// Responsible for encoding a JSON value into Protobuf bytes.
pub struct JsonEncoder {
    descriptor: MessageDescriptor,
    options: LoaderOptions,
}

impl Encoder for JsonEncoder {
    type Item = serde_json::Value;
    type Error = Status;

    fn encode(&mut self, item: Self::Item, dst: &mut EncodeBuf<'_>) -> Result<(), Self::Error> {
        // serde_json::Value implements IntoDeserializer, so we can pass it directly.
        let msg = DynamicMessage::deserialize_with_options(
            self.descriptor.clone(),
            item,
            &self.options.deserialize_options(),
        )
        .map_err(|e| {
            Status::invalid_argument(format!(
                "JSON structure does not match Protobuf schema: {}",
                e
            ))
        })?;

        msg.encode_raw(dst);
        Ok(())
    }
}

/// Responsible for decoding Protobuf bytes into a JSON value.
pub struct JsonDecoder {
    descriptor: MessageDescriptor,
    options: LoaderOptions,
}

impl Decoder for JsonDecoder {
    type Item = serde_json::Value;
    type Error = Status;

    fn decode(&mut self, src: &mut DecodeBuf<'_>) -> Result<Option<Self::Item>, Self::Error> {
        let mut msg = DynamicMessage::new(self.descriptor.clone());
        msg.merge(src)
            .map_err(|e| Status::internal(format!("Failed to decode Protobuf bytes: {}", e)))?;

        let value = self
            .options
            .to_json(&msg)
            .map_err(|e| Status::internal(format!("Failed to map message to JSON: {}", e)))?;

        Ok(Some(value))
    }
}
