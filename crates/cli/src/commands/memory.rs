//! `lysai memory`: inspect and maintain episodic memory.

use crate::wiring::{Memory, load_config};
use lysai_core::{Episode, EpisodeId, EpisodeStore, SimilarityIndex};

/// Characters of question text shown per listed episode.
const QUESTION_PREVIEW: usize = 80;

fn preview(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(QUESTION_PREVIEW).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

fn episode_line(episode: &Episode) -> String {
    let outcome = episode.outcome.map_or("pending", |o| o.as_str());
    format!(
        "#{:<5} {}  [{outcome}]  {}",
        episode.id,
        episode.timestamp.format("%Y-%m-%d %H:%M"),
        preview(&episode.question)
    )
}

pub async fn search(query: &str, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let memory = Memory::open(&config).await?;

    println!("🔍 Searching memories for: \"{query}\"");
    println!();

    let keyword = memory.store.search_similar(query, limit).await?;
    println!("  Keyword matches:");
    if keyword.is_empty() {
        println!("    (none)");
    }
    for episode in &keyword {
        println!("    {}", episode_line(episode));
    }

    if let Some(index) = &memory.semantic {
        let similar = index.search_similar_questions(query, limit).await;
        println!();
        println!("  Similar questions:");
        if similar.is_empty() {
            println!("    (none)");
        }
        for hit in &similar {
            println!(
                "    [{:.2}] {}",
                hit.similarity,
                episode_line(&hit.episode)
            );
        }
    }

    Ok(())
}

pub async fn recent(limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let memory = Memory::open(&config).await?;

    let episodes = memory.store.recent_successes(limit).await?;
    if episodes.is_empty() {
        println!("   No successful runs stored yet.");
        return Ok(());
    }

    println!("🧠 Recent successful runs");
    println!();
    for episode in &episodes {
        println!("  {}", episode_line(episode));
        if let Some(insight) = &episode.insight {
            println!("         {}", preview(insight));
        }
    }

    Ok(())
}

pub async fn show(id: i64) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let memory = Memory::open(&config).await?;

    match memory.store.get_episode(EpisodeId(id)).await? {
        Some(episode) => println!("{}", serde_json::to_string_pretty(&episode)?),
        None => return Err(format!("Episode {id} not found").into()),
    }

    Ok(())
}

pub async fn reindex(limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let memory = Memory::open(&config).await?;

    let Some(index) = &memory.semantic else {
        println!("   Similarity index is disabled (memory.index = \"none\").");
        return Ok(());
    };

    let added = index.populate_from_existing(limit).await;
    let stats = index.stats().await;
    println!("✅ Re-indexed {added} episodes");
    println!(
        "   Index now holds {} questions and {} insights",
        stats.questions, stats.insights
    );

    Ok(())
}

pub async fn stats() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config()?;
    let memory = Memory::open(&config).await?;

    println!("🧠 Memory Statistics");
    println!("====================");
    println!("  Index:      {}", config.memory.index);
    println!("  Embedder:   {}", config.memory.embedder);

    let size_kb = std::fs::metadata(&memory.db_path)
        .map(|m| m.len() as f64 / 1024.0)
        .unwrap_or(0.0);
    println!(
        "  DB file:    {} ({:.1} KB)",
        memory.db_path.display(),
        size_kb
    );

    if let Some(index) = &memory.semantic {
        let stats = index.stats().await;
        println!(
            "  Vectors:    {} questions, {} insights",
            stats.questions, stats.insights
        );
    }

    Ok(())
}
