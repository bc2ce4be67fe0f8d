//! GRIB2 data unpacking algorithms.
//!
//! - Simple packing (template 5.0) is decoded here.
//! - Everything else (complex packing, JPEG2000, PNG, CCSDS) goes through
//!   the `grib` crate decoder.

use std::io::Cursor;

use crate::Grib2Error;

/// Unpack simple packed GRIB2 data
///
/// Simple packing formula:
/// value = (reference_value + (packed_value * 2^binary_scale)) * 10^(-decimal_scale)
///
/// With a bitmap, the data section only holds values for points whose
/// bitmap bit is set; masked points come back as `None`.
pub fn unpack_simple(
    packed_data: &[u8],
    num_points: u32,
    bits_per_value: u8,
    reference_value: f32,
    binary_scale_factor: i16,
    decimal_scale_factor: i16,
    bitmap: Option<&[u8]>,
) -> Result<Vec<Option<f32>>, Grib2Error> {
    let num_points = num_points as usize;

    if let Some(bm) = bitmap {
        if bm.len() * 8 < num_points {
            return Err(Grib2Error::UnpackingError(format!(
                "bitmap covers {} points, grid has {}",
                bm.len() * 8,
                num_points
            )));
        }
    }

    let binary_scale = 2.0_f64.powi(binary_scale_factor as i32);
    let decimal_scale = 10.0_f64.powi(-(decimal_scale_factor as i32));
    let reference = reference_value as f64;

    let mut values = Vec::with_capacity(num_points);
    let mut bit_position = 0;
    let bits_per_value = bits_per_value as usize;

    for i in 0..num_points {
        if let Some(bm) = bitmap {
            // 1 bit per grid point, MSB first, 1 = value present
            if (bm[i / 8] >> (7 - (i % 8))) & 1 == 0 {
                values.push(None);
                continue;
            }
        }

        if bits_per_value == 0 {
            // Constant field
            values.push(Some((reference * decimal_scale) as f32));
            continue;
        }

        let packed_value = extract_bits(packed_data, bit_position, bits_per_value)
            .map_err(|e| Grib2Error::UnpackingError(format!("Failed to extract bits: {}", e)))?;

        bit_position += bits_per_value;

        let value = (reference + packed_value as f64 * binary_scale) * decimal_scale;
        values.push(Some(value as f32));
    }

    Ok(values)
}

/// Decode one message with the `grib` crate.
///
/// Used for packing templates the native path does not handle. Values come
/// back in message order, with NaN for bitmap-masked points.
pub fn unpack_with_grib_crate(raw_message: &[u8]) -> Result<Vec<f32>, Grib2Error> {
    let grib_file = grib::from_reader(Cursor::new(raw_message))
        .map_err(|e| Grib2Error::UnpackingError(format!("grib crate parse: {}", e)))?;

    let (_, submessage) = grib_file
        .iter()
        .next()
        .ok_or_else(|| Grib2Error::UnpackingError("message has no fields".to_string()))?;

    let decoder = grib::Grib2SubmessageDecoder::from(submessage)
        .map_err(|e| Grib2Error::UnpackingError(format!("grib crate decoder: {}", e)))?;

    let values = decoder
        .dispatch()
        .map_err(|e| Grib2Error::UnpackingError(format!("grib crate decode: {}", e)))?;

    Ok(values.collect())
}

/// Extract bits from a byte array
/// Returns the bits as a 32-bit unsigned integer
fn extract_bits(data: &[u8], start_bit: usize, num_bits: usize) -> Result<u32, String> {
    if num_bits > 32 || num_bits == 0 {
        return Err(format!("Invalid number of bits: {}", num_bits));
    }

    let end_bit = start_bit + num_bits;
    if end_bit.div_ceil(8) > data.len() {
        return Err("Not enough data to extract bits".to_string());
    }

    let mut result = 0u32;
    for absolute_bit in start_bit..end_bit {
        let bit = (data[absolute_bit / 8] >> (7 - (absolute_bit % 8))) & 1;
        result = (result << 1) | bit as u32;
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bits() {
        let data = vec![0b10110101];

        assert_eq!(extract_bits(&data, 0, 2).unwrap(), 0b10);
        assert_eq!(extract_bits(&data, 2, 2).unwrap(), 0b11);
        assert_eq!(extract_bits(&data, 0, 8).unwrap(), 0b10110101);
        assert!(extract_bits(&data, 4, 8).is_err());
    }

    #[test]
    fn test_extract_bits_across_bytes() {
        // 12-bit values 0xABC, 0xDEF
        let data = vec![0xAB, 0xCD, 0xEF];
        assert_eq!(extract_bits(&data, 0, 12).unwrap(), 0xABC);
        assert_eq!(extract_bits(&data, 12, 12).unwrap(), 0xDEF);
    }

    #[test]
    fn test_simple_unpacking() {
        let packed = vec![100, 200];
        let vals = unpack_simple(&packed, 2, 8, 0.0, 0, 0, None).unwrap();

        assert_eq!(vals.len(), 2);
        assert!((vals[0].unwrap() - 100.0).abs() < 0.1);
        assert!((vals[1].unwrap() - 200.0).abs() < 0.1);
    }

    #[test]
    fn test_simple_unpacking_with_scales() {
        // (250 + 4 * 2^1) * 10^-1 = 25.8
        let vals = unpack_simple(&[4], 1, 8, 250.0, 1, 1, None).unwrap();
        assert!((vals[0].unwrap() - 25.8).abs() < 1e-4);
    }

    #[test]
    fn test_bitmap_skips_missing_points() {
        // Points 0 and 2 present, point 1 masked; only two packed values
        let bitmap = [0b1010_0000];
        let vals = unpack_simple(&[10, 30], 3, 8, 0.0, 0, 0, Some(&bitmap)).unwrap();

        assert_eq!(vals, vec![Some(10.0), None, Some(30.0)]);
    }

    #[test]
    fn test_constant_field() {
        let vals = unpack_simple(&[], 4, 0, 273.0, 0, 0, None).unwrap();
        assert_eq!(vals, vec![Some(273.0); 4]);
    }

    #[test]
    fn test_short_bitmap_is_rejected() {
        let err = unpack_simple(&[1; 16], 16, 8, 0.0, 0, 0, Some(&[0xFF])).unwrap_err();
        assert!(matches!(err, Grib2Error::UnpackingError(_)));
    }
}
