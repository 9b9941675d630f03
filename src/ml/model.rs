use burn::{
    nn::{
        attention::{MultiHeadAttention, MultiHeadAttentionConfig},
        loss::CrossEntropyLossConfig,
        Dropout, DropoutConfig,
        Embedding, EmbeddingConfig,
        LayerNorm, LayerNormConfig,
        Linear, LinearConfig,
    },
    prelude::*,
    tensor::activation,
};

use crate::data::collate::TokenBatch;

// NOTE: #[derive(Config)] already generates Clone and Serialize/Deserialize
// internally — do NOT add them again or you get conflicting impls.
#[derive(Config, Debug)]
pub struct EncoderConfig {
    pub vocab_size:  usize,
    pub max_seq_len: usize,
    pub d_model:     usize,
    pub num_heads:   usize,
    pub num_layers:  usize,
    pub d_ff:        usize,
    pub dropout:     f64,
}

impl EncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> Encoder<B> {
        let token_embedding    = EmbeddingConfig::new(self.vocab_size, self.d_model).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_seq_len, self.d_model).init(device);
        // Two segments: before and after the first [SEP]
        let segment_embedding  = EmbeddingConfig::new(2, self.d_model).init(device);
        let layers: Vec<EncoderBlock<B>> = (0..self.num_layers)
            .map(|_| self.build_encoder_block(device))
            .collect();
        let final_norm = LayerNormConfig::new(self.d_model).init(device);
        let dropout    = DropoutConfig::new(self.dropout).init();
        Encoder {
            token_embedding, position_embedding, segment_embedding,
            layers, final_norm, dropout,
            max_seq_len: self.max_seq_len,
        }
    }

    pub fn init_masked_lm<B: Backend>(&self, device: &B::Device) -> MaskedLanguageModel<B> {
        MaskedLanguageModel {
            encoder: self.init(device),
            lm_head: LinearConfig::new(self.d_model, self.vocab_size).init(device),
        }
    }

    pub fn init_next_sentence<B: Backend>(&self, device: &B::Device) -> NextSentenceModel<B> {
        NextSentenceModel {
            encoder:  self.init(device),
            cls_head: LinearConfig::new(self.d_model, 2).init(device),
        }
    }

    pub fn init_span<B: Backend>(&self, device: &B::Device) -> SpanExtractionModel<B> {
        SpanExtractionModel {
            encoder:   self.init(device),
            span_head: LinearConfig::new(self.d_model, 2).init(device),
        }
    }

    pub fn init_classifier<B: Backend>(
        &self,
        num_labels: usize,
        device:     &B::Device,
    ) -> TextClassifierModel<B> {
        TextClassifierModel {
            encoder:    self.init(device),
            class_head: LinearConfig::new(self.d_model, num_labels).init(device),
        }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        let self_attn   = MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
            .with_dropout(self.dropout)
            .init(device);
        let ffn_linear1 = LinearConfig::new(self.d_model, self.d_ff).init(device);
        let ffn_linear2 = LinearConfig::new(self.d_ff, self.d_model).init(device);
        let norm1   = LayerNormConfig::new(self.d_model).init(device);
        let norm2   = LayerNormConfig::new(self.d_model).init(device);
        let dropout = DropoutConfig::new(self.dropout).init();
        EncoderBlock { self_attn, ffn_linear1, ffn_linear2, norm1, norm2, dropout }
    }
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    pub fn forward(&self, x: Tensor<B, 3>) -> Tensor<B, 3> {
        use burn::nn::attention::MhaInput;
        let attn_output = self.self_attn.forward(MhaInput::self_attn(x.clone())).context;
        let x = self.norm1.forward(x + self.dropout.forward(attn_output));
        let ffn_out = self.ffn_linear2.forward(
            activation::gelu(self.ffn_linear1.forward(x.clone()))
        );
        self.norm2.forward(x + self.dropout.forward(ffn_out))
    }
}

// ─── Shared encoder ───────────────────────────────────────────────────────────

/// The transformer body every task head sits on.
#[derive(Module, Debug)]
pub struct Encoder<B: Backend> {
    pub token_embedding:    Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub segment_embedding:  Embedding<B>,
    pub layers:             Vec<EncoderBlock<B>>,
    pub final_norm:         LayerNorm<B>,
    pub dropout:            Dropout,
    pub max_seq_len:        usize,
}

impl<B: Backend> Encoder<B> {
    /// input_ids, segment_ids: [batch, seq_len] → hidden states [batch, seq_len, d_model]
    pub fn forward(
        &self,
        input_ids:   Tensor<B, 2, Int>,
        segment_ids: Tensor<B, 2, Int>,
    ) -> Tensor<B, 3> {
        let [batch_size, seq_len] = input_ids.dims();

        let tok_emb = self.token_embedding.forward(input_ids);
        let seg_emb = self.segment_embedding.forward(segment_ids);

        // Self-attention is permutation-invariant, so position must be injected explicitly.
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &tok_emb.device())
            .unsqueeze::<2>()
            .expand([batch_size, seq_len]);
        let pos_emb = self.position_embedding.forward(positions);

        let mut x = self.dropout.forward(tok_emb + pos_emb + seg_emb);
        for layer in &self.layers {
            x = layer.forward(x);
        }
        self.final_norm.forward(x)
    }

    /// Hidden state at the [CLS] position, [batch, d_model].
    fn pool_cls(hidden: Tensor<B, 3>) -> Tensor<B, 2> {
        let [batch_size, _seq_len, d_model] = hidden.dims();
        hidden
            .slice([0..batch_size, 0..1, 0..d_model])
            .reshape([batch_size, d_model])
    }
}

// ─── Task heads ───────────────────────────────────────────────────────────────

/// Per-position vocabulary logits, for masked prediction and
/// mask-infill generation.
#[derive(Module, Debug)]
pub struct MaskedLanguageModel<B: Backend> {
    pub encoder: Encoder<B>,
    pub lm_head: Linear<B>,
}

impl<B: Backend> MaskedLanguageModel<B> {
    /// → logits [batch, seq_len, vocab_size]
    pub fn forward(
        &self,
        input_ids:   Tensor<B, 2, Int>,
        segment_ids: Tensor<B, 2, Int>,
    ) -> Tensor<B, 3> {
        self.lm_head.forward(self.encoder.forward(input_ids, segment_ids))
    }
}

/// Two-way sentence-order logits read off the [CLS] position.
#[derive(Module, Debug)]
pub struct NextSentenceModel<B: Backend> {
    pub encoder:  Encoder<B>,
    pub cls_head: Linear<B>,
}

impl<B: Backend> NextSentenceModel<B> {
    /// → logits [batch, 2]; index 0 is the "continuation" class
    pub fn forward(
        &self,
        input_ids:   Tensor<B, 2, Int>,
        segment_ids: Tensor<B, 2, Int>,
    ) -> Tensor<B, 2> {
        let hidden = self.encoder.forward(input_ids, segment_ids);
        self.cls_head.forward(Encoder::pool_cls(hidden))
    }
}

/// Start/end position logits over the sequence.
#[derive(Module, Debug)]
pub struct SpanExtractionModel<B: Backend> {
    pub encoder:   Encoder<B>,
    pub span_head: Linear<B>,
}

pub struct SpanOutput<B: Backend> {
    pub start_logits: Tensor<B, 2>,
    pub end_logits:   Tensor<B, 2>,
}

impl<B: Backend> SpanExtractionModel<B> {
    /// → start_logits, end_logits: [batch, seq_len]
    pub fn forward(
        &self,
        input_ids:   Tensor<B, 2, Int>,
        segment_ids: Tensor<B, 2, Int>,
    ) -> SpanOutput<B> {
        let [batch_size, seq_len] = input_ids.dims();
        let hidden = self.encoder.forward(input_ids, segment_ids);

        // Project to 2 logits per token then split into start / end.
        let logits = self.span_head.forward(hidden); // [batch, seq_len, 2]
        let start_logits = logits.clone()
            .slice([0..batch_size, 0..seq_len, 0..1])
            .reshape([batch_size, seq_len]);
        let end_logits = logits
            .slice([0..batch_size, 0..seq_len, 1..2])
            .reshape([batch_size, seq_len]);

        SpanOutput { start_logits, end_logits }
    }
}

/// Class logits read off the [CLS] position.
#[derive(Module, Debug)]
pub struct TextClassifierModel<B: Backend> {
    pub encoder:    Encoder<B>,
    pub class_head: Linear<B>,
}

impl<B: Backend> TextClassifierModel<B> {
    /// → logits [batch, num_labels]
    pub fn forward(
        &self,
        input_ids:   Tensor<B, 2, Int>,
        segment_ids: Tensor<B, 2, Int>,
    ) -> Tensor<B, 2> {
        let hidden = self.encoder.forward(input_ids, segment_ids);
        self.class_head.forward(Encoder::pool_cls(hidden))
    }
}

// ─── Losses ───────────────────────────────────────────────────────────────────

/// Cross-entropy over the labelled positions only. Positions whose
/// label is negative (the ignore sentinel) contribute nothing to
/// the sum or the normaliser.
pub fn masked_cross_entropy<B: Backend>(
    logits: Tensor<B, 3>,
    labels: Tensor<B, 2, Int>,
) -> Tensor<B, 1> {
    let [batch_size, seq_len, _vocab] = logits.dims();
    let log_probs = activation::log_softmax(logits, 2);

    let mask_int = labels.clone().greater_equal_elem(0).int();
    // Sentinel labels become index 0; the mask zeroes their term
    let safe_labels = labels * mask_int.clone();

    let gathered = log_probs
        .gather(2, safe_labels.unsqueeze_dim::<3>(2))
        .reshape([batch_size, seq_len]);

    let mask_f = mask_int.float();
    let total  = (gathered * mask_f.clone()).sum().neg();
    total / mask_f.sum().clamp_min(1.0)
}

/// The one seam the trainer needs: a scalar loss per batch, plus an
/// optional correct/total count for accuracy reporting.
pub trait BatchLoss<B: Backend> {
    fn batch_loss(&self, batch: TokenBatch<B>) -> Tensor<B, 1>;

    fn batch_correct(&self, _batch: TokenBatch<B>) -> Option<(usize, usize)> {
        None
    }
}

impl<B: Backend> BatchLoss<B> for MaskedLanguageModel<B> {
    fn batch_loss(&self, batch: TokenBatch<B>) -> Tensor<B, 1> {
        let logits = self.forward(batch.input_ids, batch.segment_ids);
        masked_cross_entropy(logits, batch.labels)
    }
}

impl<B: Backend> BatchLoss<B> for SpanExtractionModel<B> {
    fn batch_loss(&self, batch: TokenBatch<B>) -> Tensor<B, 1> {
        let output = self.forward(batch.input_ids, batch.segment_ids);
        let ce = CrossEntropyLossConfig::new().init(&output.start_logits.device());
        // Loss = (CE_start + CE_end) / 2
        (ce.forward(output.start_logits, batch.span_starts)
            + ce.forward(output.end_logits, batch.span_ends)) / 2.0_f64
    }
}

impl<B: Backend> BatchLoss<B> for TextClassifierModel<B> {
    fn batch_loss(&self, batch: TokenBatch<B>) -> Tensor<B, 1> {
        let logits = self.forward(batch.input_ids, batch.segment_ids);
        let ce = CrossEntropyLossConfig::new().init(&logits.device());
        ce.forward(logits, batch.class_targets)
    }

    fn batch_correct(&self, batch: TokenBatch<B>) -> Option<(usize, usize)> {
        let total = batch.class_targets.dims()[0];
        let logits = self.forward(batch.input_ids, batch.segment_ids);
        let predicted = logits.argmax(1).flatten::<1>(0, 1);
        let correct = predicted
            .equal(batch.class_targets)
            .int()
            .sum()
            .into_scalar()
            .elem::<i64>();
        Some((correct as usize, total))
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::collate::PaddingCollator;
    use crate::data::dataset::{TokenizedRow, IGNORE_LABEL};
    use burn::data::dataloader::batcher::Batcher;

    type TestBackend = burn::backend::NdArray;

    fn tiny_config() -> EncoderConfig {
        EncoderConfig::new(16, 8, 8, 2, 1, 16, 0.0)
    }

    #[test]
    fn test_masked_lm_logit_shape() {
        let device = Default::default();
        let model = tiny_config().init_masked_lm::<TestBackend>(&device);

        let ids  = Tensor::<TestBackend, 1, Int>::from_ints([1, 7, 2, 1, 5, 2], &device)
            .reshape([2, 3]);
        let segs = Tensor::<TestBackend, 2, Int>::zeros([2, 3], &device);
        let logits = model.forward(ids, segs);
        assert_eq!(logits.dims(), [2, 3, 16]);
    }

    #[test]
    fn test_span_model_splits_start_and_end() {
        let device = Default::default();
        let model = tiny_config().init_span::<TestBackend>(&device);

        let ids  = Tensor::<TestBackend, 2, Int>::ones([2, 5], &device);
        let segs = Tensor::<TestBackend, 2, Int>::zeros([2, 5], &device);
        let out = model.forward(ids, segs);
        assert_eq!(out.start_logits.dims(), [2, 5]);
        assert_eq!(out.end_logits.dims(), [2, 5]);
    }

    #[test]
    fn test_masked_cross_entropy_of_uniform_logits_is_log_vocab() {
        let device = Default::default();
        // Uniform logits over 16 classes, one labelled position
        let logits = Tensor::<TestBackend, 3>::zeros([1, 2, 16], &device);
        let labels = Tensor::<TestBackend, 1, Int>::from_ints(
            [3, IGNORE_LABEL as i32], &device
        ).reshape([1, 2]);

        let loss = masked_cross_entropy(logits, labels).into_scalar().elem::<f32>();
        assert!((loss - (16.0_f32).ln()).abs() < 1e-4, "loss was {loss}");
    }

    #[test]
    fn test_masked_cross_entropy_is_zero_when_nothing_is_labelled() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 3>::zeros([1, 3, 16], &device);
        let labels = Tensor::<TestBackend, 1, Int>::from_ints(
            [IGNORE_LABEL as i32, IGNORE_LABEL as i32, IGNORE_LABEL as i32],
            &device,
        ).reshape([1, 3]);

        let loss = masked_cross_entropy(logits, labels).into_scalar().elem::<f32>();
        assert_eq!(loss, 0.0);
    }

    #[test]
    fn test_classifier_reports_correct_counts() {
        let device = Default::default();
        let model = tiny_config().init_classifier::<TestBackend>(3, &device);

        let mut row_a = TokenizedRow::new(vec![1, 7, 2], vec![0, 0, 0], vec![IGNORE_LABEL; 3]);
        row_a.class_label = Some(0);
        let mut row_b = TokenizedRow::new(vec![1, 5, 2], vec![0, 0, 0], vec![IGNORE_LABEL; 3]);
        row_b.class_label = Some(2);

        let collator = PaddingCollator::<TestBackend>::new(Default::default(), 0);
        let batch = collator.batch(vec![row_a, row_b]);

        let (correct, total) = model.batch_correct(batch).unwrap();
        assert_eq!(total, 2);
        assert!(correct <= 2);
    }
}
