//! Alpaca `application/imagebytes` binary frame
//!
//! # Frame Format
//!
//! All header fields are little-endian 32-bit integers:
//! ```text
//! [MetadataVersion][ErrorNumber][ClientTransactionID][ServerTransactionID]
//! [DataStart][ImageElementType][TransmissionElementType]
//! [Rank][Dimension1][Dimension2][Dimension3]
//! ```
//! `DataStart` is the offset of the payload. When `ErrorNumber` is non-zero
//! the payload is a UTF-8 error message running to the end of the frame;
//! otherwise it is the raw pixel data.

use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// The only metadata layout currently defined
pub const METADATA_VERSION: i32 = 1;

/// Size of the version 1 header in bytes
pub const HEADER_LEN: usize = 44;

/// MIME type announcing an ImageBytes body
pub const IMAGE_BYTES_MIME: &str = "application/imagebytes";

/// Decoded version 1 metadata
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageBytesHeader {
    pub metadata_version: i32,
    pub error_number: i32,
    pub client_transaction_id: u32,
    pub server_transaction_id: u32,
    pub data_start: i32,
    pub image_element_type: i32,
    pub transmission_element_type: i32,
    pub rank: i32,
    pub dimensions: [i32; 3],
}

/// A decoded frame: header plus either an error message or pixel data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBytesFrame {
    pub header: ImageBytesHeader,
    pub error_message: Option<String>,
    pub data: Vec<u8>,
}

/// Decode a frame, assuming the version 1 layout whatever version it reports
pub fn decode(bytes: &[u8]) -> crate::Result<ImageBytesFrame> {
    if bytes.len() < HEADER_LEN {
        return Err(crate::ConformError::InvalidResponse(format!(
            "ImageBytes frame is {} bytes, shorter than the {} byte header",
            bytes.len(),
            HEADER_LEN
        )));
    }

    let mut cursor = Cursor::new(bytes);
    let header = ImageBytesHeader {
        metadata_version: cursor.read_i32::<LittleEndian>()?,
        error_number: cursor.read_i32::<LittleEndian>()?,
        client_transaction_id: cursor.read_u32::<LittleEndian>()?,
        server_transaction_id: cursor.read_u32::<LittleEndian>()?,
        data_start: cursor.read_i32::<LittleEndian>()?,
        image_element_type: cursor.read_i32::<LittleEndian>()?,
        transmission_element_type: cursor.read_i32::<LittleEndian>()?,
        rank: cursor.read_i32::<LittleEndian>()?,
        dimensions: [
            cursor.read_i32::<LittleEndian>()?,
            cursor.read_i32::<LittleEndian>()?,
            cursor.read_i32::<LittleEndian>()?,
        ],
    };

    let data_start = usize::try_from(header.data_start)
        .ok()
        .filter(|start| (HEADER_LEN..=bytes.len()).contains(start))
        .ok_or_else(|| {
            crate::ConformError::InvalidResponse(format!(
                "ImageBytes DataStart {} is outside the {} byte frame",
                header.data_start,
                bytes.len()
            ))
        })?;
    let payload = &bytes[data_start..];

    if header.error_number != 0 {
        let message = String::from_utf8(payload.to_vec()).map_err(|e| {
            crate::ConformError::InvalidResponse(format!(
                "ImageBytes error message is not UTF-8: {}",
                e
            ))
        })?;
        Ok(ImageBytesFrame {
            header,
            error_message: Some(message),
            data: Vec::new(),
        })
    } else {
        Ok(ImageBytesFrame {
            header,
            error_message: None,
            data: payload.to_vec(),
        })
    }
}

/// Encode a frame; `data_start` is always written as [`HEADER_LEN`]
pub fn encode(frame: &ImageBytesFrame) -> Vec<u8> {
    let payload: &[u8] = match &frame.error_message {
        Some(message) if frame.header.error_number != 0 => message.as_bytes(),
        _ => &frame.data,
    };
    let h = &frame.header;

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    // Writes into a Vec cannot fail
    let _ = out.write_i32::<LittleEndian>(h.metadata_version);
    let _ = out.write_i32::<LittleEndian>(h.error_number);
    let _ = out.write_u32::<LittleEndian>(h.client_transaction_id);
    let _ = out.write_u32::<LittleEndian>(h.server_transaction_id);
    let _ = out.write_i32::<LittleEndian>(HEADER_LEN as i32);
    let _ = out.write_i32::<LittleEndian>(h.image_element_type);
    let _ = out.write_i32::<LittleEndian>(h.transmission_element_type);
    let _ = out.write_i32::<LittleEndian>(h.rank);
    for dimension in h.dimensions {
        let _ = out.write_i32::<LittleEndian>(dimension);
    }
    out.extend_from_slice(payload);
    out
}
