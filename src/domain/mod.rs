// ============================================================
// Domain Layer
// ============================================================
// Pure Rust structs that define what the system talks about —
// raw dataset rows on the way in, ranked results on the way out.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O
//   - NO tokenizer types
//
// Why keep this layer pure?
//   - Easy to unit test (no GPU needed)
//   - Caller-facing records stay stable even if the ML stack
//     underneath is swapped
//
// Reference: Rust Book §5 (Structs), §7 (Modules)

// Raw dataset rows (column name → text) before tokenisation
pub mod raw;

// Terminal result records handed back to callers
pub mod results;
