// ============================================================
// Infrastructure Layer
// ============================================================
// Persistence concerns shared by every task wrapper:
//
//   model_store.rs     — Saved-model directories
//                        Uses Burn's CompactRecorder to
//                        serialise model parameters to disk,
//                        plus a JSON descriptor (task kind +
//                        architecture) so loading can rebuild
//                        the exact model and refuse a directory
//                        saved by a different task.
//
//   tokenizer_store.rs — Tokenizer persistence
//                        Builds a word-level tokenizer from a
//                        corpus when a task is created from
//                        scratch, or loads a previously saved
//                        one. Ensures the same vocabulary is
//                        used for training and inference.
//
// Why is this a separate layer?
//   Both stores are used by all five task wrappers but belong
//   to none of them. Keeping them here prevents duplication and
//   keeps the wrappers focused on task logic.
//
// Reference: Rust Book §7 (Modules)
//            Burn Book §5 (Checkpointing)

/// Saved-model directory reading and writing
pub mod model_store;

/// Tokenizer building, saving, and loading
pub mod tokenizer_store;
