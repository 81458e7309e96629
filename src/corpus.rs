//! Deterministic synthetic corpus generation and loading.
//!
//! Generates reproducible PT-BR pseudo-text documents grouped by target size
//! for embedding throughput benchmarks.
//!
//! # Line Format
//!
//! ```text
//! {"id":0,"size_target":256,"text":"Lote ciclo dados ..."}
//! {"id":1,"size_target":256,"text":"..."}
//! ```
//!
//! One independent JSON object per line, no array wrapper. Records are
//! size-group-major (group order follows the size list) and generation-order
//! minor; `id` is the dense 0-based position in the file.

use crate::error::{BenchError, Result};
use log::info;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Fixed PT-BR vocabulary sampled uniformly with replacement.
pub const VOCABULARY: &[&str] = &[
    "acao", "acesso", "agora", "ainda", "algoritmo", "amostra", "analise", "apoio",
    "arquivo", "atencao", "banco", "caminho", "capaz", "caso", "cidade", "ciclo",
    "ciencia", "codigo", "coleta", "comando", "contexto", "controle", "dados", "decisao",
    "desempenho", "detalhe", "dia", "documento", "efeito", "ensaio", "entrega", "equipo",
    "escala", "escolha", "estado", "estimativa", "evento", "exemplo", "experimento", "fato",
    "falha", "familia", "fase", "filtro", "forma", "geracao", "gestao", "grupo",
    "historia", "ideia", "impacto", "indice", "informacao", "inicio", "instante", "lote",
    "maior", "matriz", "media", "memoria", "metodo", "modelo", "motor", "nivel",
    "novo", "objetivo", "opcao", "ordem", "parte", "passo", "perda", "perfil",
    "periodo", "peso", "plano", "ponto", "processo", "produto", "qualidade", "quantidade",
    "queda", "rede", "registro", "relacao", "relato", "resumo", "resultado", "risco",
    "rotina", "saida", "semente", "sentenca", "serie", "sinal", "sistema", "tabela",
    "tarefa", "tempo", "texto", "tolerancia", "valor", "variacao", "vetor", "visao",
    "volume", "zona",
];

/// Default target sizes in characters.
pub const DEFAULT_SIZES: &[usize] = &[256, 512, 1024, 2048, 4096, 8192];

/// Inclusive bounds for the number of words per sentence.
/// `u32` keeps the draw at one 32-bit word of the stream on every target.
const SENTENCE_WORDS_MIN: u32 = 6;
const SENTENCE_WORDS_MAX: u32 = 14;

/// One document of the synthetic corpus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorpusRecord {
    pub id: u64,
    pub size_target: usize,
    pub text: String,
}

/// Vocabulary selector. Only one language exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    PtBr,
}

impl Language {
    pub fn parse(raw: &str) -> Result<Self> {
        if raw.trim().eq_ignore_ascii_case("pt-br") {
            Ok(Language::PtBr)
        } else {
            Err(BenchError::UnsupportedLanguage(raw.to_string()))
        }
    }

    pub fn vocabulary(&self) -> &'static [&'static str] {
        match self {
            Language::PtBr => VOCABULARY,
        }
    }
}

/// Configuration for corpus generation.
#[derive(Debug, Clone)]
pub struct GenerateConfig {
    /// Random seed for deterministic generation.
    pub seed: u64,
    /// Target character sizes, one group per entry.
    pub sizes: Vec<usize>,
    /// Number of documents per size group.
    pub n_per_size: usize,
    pub language: Language,
    /// Optional lower bound on words per document, checked alongside the size.
    pub min_words: Option<usize>,
}

impl Default for GenerateConfig {
    fn default() -> Self {
        Self {
            seed: 13,
            sizes: DEFAULT_SIZES.to_vec(),
            n_per_size: 24,
            language: Language::PtBr,
            min_words: None,
        }
    }
}

/// Parse a comma-separated size list such as `"256, 512,1024"`.
///
/// Empty entries are skipped; every remaining entry must be a positive integer.
pub fn parse_sizes(raw: &str) -> Result<Vec<usize>> {
    let mut sizes = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let size: usize = part.parse().map_err(|e| BenchError::InvalidSizeList {
            raw: raw.to_string(),
            message: format!("'{part}': {e}"),
        })?;
        if size == 0 {
            return Err(BenchError::InvalidSizeList {
                raw: raw.to_string(),
                message: "sizes must be > 0".to_string(),
            });
        }
        sizes.push(size);
    }
    Ok(sizes)
}

fn push_sentence(rng: &mut ChaCha8Rng, vocabulary: &[&str], text: &mut String) -> usize {
    let length = rng.gen_range(SENTENCE_WORDS_MIN..=SENTENCE_WORDS_MAX) as usize;
    if !text.is_empty() {
        text.push(' ');
    }
    for i in 0..length {
        // Non-empty vocabulary is a module invariant.
        let word = vocabulary.choose(rng).copied().unwrap_or("dados");
        if i == 0 {
            let mut chars = word.chars();
            if let Some(first) = chars.next() {
                text.extend(first.to_uppercase());
                text.push_str(chars.as_str());
            }
        } else {
            text.push(' ');
            text.push_str(word);
        }
    }
    text.push('.');
    length
}

/// Synthesize one document of at least `target_chars` characters.
///
/// Sentences are appended until both the character target and the optional
/// word minimum are met. Text grows strictly on every iteration, so this
/// always terminates.
pub fn build_text(
    target_chars: usize,
    rng: &mut ChaCha8Rng,
    vocabulary: &[&str],
    min_words: Option<usize>,
) -> String {
    let mut text = String::with_capacity(target_chars + 128);
    let mut chars = 0usize;
    let mut words = 0usize;
    loop {
        let before = text.len();
        words += push_sentence(rng, vocabulary, &mut text);
        chars += text[before..].chars().count();

        if chars < target_chars {
            continue;
        }
        if min_words.is_some_and(|min| words < min) {
            continue;
        }
        return text;
    }
}

/// Iterate the corpus in generation order without materializing it.
pub struct CorpusGenerator<'a> {
    config: &'a GenerateConfig,
    rng: ChaCha8Rng,
    next_id: u64,
    total: u64,
}

impl<'a> CorpusGenerator<'a> {
    /// Fails when the record count does not fit the id space.
    pub fn new(config: &'a GenerateConfig) -> Result<Self> {
        let total = config
            .sizes
            .len()
            .checked_mul(config.n_per_size)
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| {
                BenchError::config(
                    "n_per_size",
                    format!(
                        "{} sizes x {} docs overflows the record count",
                        config.sizes.len(),
                        config.n_per_size
                    ),
                )
            })?;
        Ok(Self {
            config,
            rng: ChaCha8Rng::seed_from_u64(config.seed),
            next_id: 0,
            total,
        })
    }
}

impl Iterator for CorpusGenerator<'_> {
    type Item = CorpusRecord;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_id >= self.total {
            return None;
        }
        let group = self.next_id as usize / self.config.n_per_size;
        let size_target = self.config.sizes[group];
        let text = build_text(
            size_target,
            &mut self.rng,
            self.config.language.vocabulary(),
            self.config.min_words,
        );
        let record = CorpusRecord {
            id: self.next_id,
            size_target,
            text,
        };
        self.next_id += 1;
        Some(record)
    }
}

/// Generate the whole corpus in memory.
pub fn generate_corpus(config: &GenerateConfig) -> Result<Vec<CorpusRecord>> {
    Ok(CorpusGenerator::new(config)?.collect())
}

/// Serialize records in line format to any writer.
pub fn write_records<W: Write>(
    writer: &mut W,
    records: impl IntoIterator<Item = CorpusRecord>,
) -> Result<u64> {
    let mut written = 0u64;
    for record in records {
        serde_json::to_writer(&mut *writer, &record)?;
        writer
            .write_all(b"\n")
            .map_err(|e| BenchError::io("writing corpus record", e))?;
        written += 1;
    }
    Ok(written)
}

/// Stream a generated corpus to `path`, creating parent directories and
/// replacing any existing file. Returns the number of records written.
pub fn write_corpus<P: AsRef<Path>>(path: P, config: &GenerateConfig) -> Result<u64> {
    let path = path.as_ref();
    let generator = CorpusGenerator::new(config)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| BenchError::io(format!("creating {}", parent.display()), e))?;
    }

    let file = File::create(path)
        .map_err(|e| BenchError::io(format!("creating {}", path.display()), e))?;
    let mut writer = BufWriter::with_capacity(64 * 1024, file);

    let written = write_records(&mut writer, generator)?;
    writer
        .flush()
        .map_err(|e| BenchError::io(format!("flushing {}", path.display()), e))?;

    info!("wrote {written} docs to {}", path.display());
    Ok(written)
}

/// Load a corpus file. Blank lines are skipped.
///
/// A missing file and an empty-but-present file are reported as distinct
/// errors, so callers can tell them apart before loading any model.
pub fn load_corpus<P: AsRef<Path>>(path: P) -> Result<Vec<CorpusRecord>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(BenchError::CorpusNotFound(path.to_path_buf()));
    }
    let file =
        File::open(path).map_err(|e| BenchError::io(format!("opening {}", path.display()), e))?;
    let reader = BufReader::with_capacity(64 * 1024, file);

    let mut records = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| BenchError::io(format!("reading {}", path.display()), e))?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|source| BenchError::MalformedCorpus {
            path: PathBuf::from(path),
            line: idx + 1,
            source,
        })?;
        records.push(record);
    }

    if records.is_empty() {
        return Err(BenchError::EmptyCorpus(path.to_path_buf()));
    }
    Ok(records)
}
