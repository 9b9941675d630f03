// ============================================================
// Data Pipeline
// ============================================================
// Everything between a raw dataset file and a tensor batch.
//
// The pipeline flows in this order:
//
//   CSV / text file
//       │
//       ▼
//   loader            → reads rows, validates required columns
//       │
//       ▼
//   splitter          → seeded shuffle + train/eval split
//       │               (skipped when an eval file is given)
//       ▼
//   adapter           → task-specific tokenisation into
//       │               TokenizedRows ([CLS]/[SEP], segments,
//       │               labels, spans)
//       ▼
//   dataset           → implements Burn's Dataset trait
//       │
//       ▼
//   collate           → pads and stacks into TokenBatch tensors,
//       │               with dynamic masking for LM training
//       ▼
//   DataLoader        → feeds batches to the training loop
//
// cache sits beside the adapter step: a directory of JSONL
// partitions that lets a run skip straight from file paths to
// TokenizedRows. pipeline wires the whole chain together.
//
// Each module is responsible for exactly one step.
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// Reads CSV / plain-text rows and validates required columns
pub mod loader;

/// Seeded shuffle and train/eval split
pub mod splitter;

/// Task-specific tokenisation of raw rows
pub mod adapter;

/// TokenizedRow and Burn's Dataset trait implementation
pub mod dataset;

/// Padding and masking collators (Burn's Batcher trait)
pub mod collate;

/// Directory cache of preprocessed partitions
pub mod cache;

/// End-to-end preprocessing orchestration
pub mod pipeline;
