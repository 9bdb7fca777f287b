/// The tokenizer seam. Implementations live outside this crate; the
/// pipeline only relies on the id-level contract below.
pub trait Vocab {
    /// Token ids for `text`, including a trailing end-of-text id.
    fn encode(&self, text: &str) -> Vec<i64>;

    /// Id of the separator placed between source and target.
    fn sep_token_id(&self) -> i64;

    /// Id used to right-pad merged sequences.
    fn pad_token_id(&self) -> i64;
}
