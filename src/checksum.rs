//! Rolling word checksum, used to cross-check firmware integrity
//! independently of cryptographic signing.

/// Checksum over `data`, two little-endian bytes at a time.
///
/// Two 16-bit running sums are seeded at `0xFFFF` and folded back into 16
/// bits after every addition. A trailing byte of odd-length input is
/// ignored. The result is `(msw << 16) | lsw`.
pub fn checksum(data: &[u8]) -> u32 {
    let mut lsw: u32 = 0xffff;
    let mut msw: u32 = 0xffff;
    for word in data.chunks_exact(2) {
        lsw += u16::from_le_bytes([word[0], word[1]]) as u32;
        msw += lsw;
        lsw = (lsw & 0xffff) + (lsw >> 16);
        msw = (msw & 0xffff) + (msw >> 16);
    }
    (msw << 16) | lsw
}
