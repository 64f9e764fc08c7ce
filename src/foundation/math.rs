pub(crate) fn mul_div255_u16(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

pub(crate) fn mul_div255_u8(x: u16, y: u16) -> u8 {
    mul_div255_u16(x, y) as u8
}

/// Flatten premultiplied RGBA8 over an opaque background, producing straight
/// opaque RGBA8 suitable for a rawvideo encoder input.
pub(crate) fn flatten_premul_over_bg_to_opaque_rgba8(
    dst: &mut [u8],
    src_premul: &[u8],
    bg_rgba: [u8; 4],
) -> crate::foundation::error::FramecastResult<()> {
    use crate::foundation::error::FramecastError;

    if dst.len() != src_premul.len() || !dst.len().is_multiple_of(4) {
        return Err(FramecastError::validation(
            "flatten_premul_over_bg_to_opaque_rgba8 expects equal-length rgba8 buffers",
        ));
    }

    let bg_r = bg_rgba[0] as u16;
    let bg_g = bg_rgba[1] as u16;
    let bg_b = bg_rgba[2] as u16;

    for (d, s) in dst.chunks_exact_mut(4).zip(src_premul.chunks_exact(4)) {
        let a = s[3] as u16;
        if a == 255 {
            d.copy_from_slice(s);
            d[3] = 255;
            continue;
        }

        let inv = 255u16 - a;
        let r = s[0] as u16 + mul_div255_u16(bg_r, inv);
        let g = s[1] as u16 + mul_div255_u16(bg_g, inv);
        let b = s[2] as u16 + mul_div255_u16(bg_b, inv);

        d[0] = r.min(255) as u8;
        d[1] = g.min(255) as u8;
        d[2] = b.min(255) as u8;
        d[3] = 255;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mul_div255_rounds_to_nearest() {
        assert_eq!(mul_div255_u16(255, 255), 255);
        assert_eq!(mul_div255_u16(255, 0), 0);
        assert_eq!(mul_div255_u16(128, 128), 64);
    }

    #[test]
    fn flatten_premul_over_black_produces_expected_rgb() {
        // Premultiplied red @ 50% alpha over black stays 128,0,0.
        let src = vec![128u8, 0u8, 0u8, 128u8];
        let mut dst = vec![0u8; 4];
        flatten_premul_over_bg_to_opaque_rgba8(&mut dst, &src, [0, 0, 0, 255]).unwrap();
        assert_eq!(dst, vec![128u8, 0u8, 0u8, 255u8]);
    }

    #[test]
    fn flatten_rejects_mismatched_buffers() {
        let src = vec![0u8; 8];
        let mut dst = vec![0u8; 4];
        assert!(flatten_premul_over_bg_to_opaque_rgba8(&mut dst, &src, [0, 0, 0, 255]).is_err());
    }
}
