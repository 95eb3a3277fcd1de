/// Configuration for the [Engine](super::Engine).
#[derive(Clone, Debug)]
pub struct Config {
    /// Size of every block in bytes.
    ///
    /// The last block of a payload is zero padded to this size. The configured encoder, if
    /// any, must accept it (Reed-Solomon requires an even size).
    pub block_size: usize,

    /// Maximum number of data blocks per segment.
    pub segment_size: usize,
}
