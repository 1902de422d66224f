pub fn hex_serialize<S, T>(x: &T, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
    T: AsRef<[u8]>,
{
    s.serialize_str(&hex::encode(x.as_ref()))
}

/// Next multiple of `2^alignment`, or `None` when the computation overflows.
pub fn align_up(size: usize, alignment: u8) -> Option<usize> {
    let block = 1usize.checked_shl(alignment as u32)?;
    let mask = block - 1;
    size.checked_add(mask).map(|padded| padded & !mask)
}
