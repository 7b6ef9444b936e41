/*!
Hash functions used by partition transforms ([`murmur3`]) and bloom filters
(XXH64, via the `twox-hash` crate directly in [`crate::bloom`]).
*/
pub mod murmur3;
