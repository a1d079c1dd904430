//! Prompt templates for extraction, summarization, keyword tiering and answering.
//!
//! Every template takes its delimiters and language from the caller's
//! configuration; nothing here is global or mutable.

use crate::config::ExtractionConfig;
use crate::types::ResponseType;

/// Canonical answer when no evidence is available.
pub const FAIL_RESPONSE: &str =
    "Sorry, I'm not able to provide an answer to that question.[no-context]";

/// Exact reply to the loop-check prompt that requests another pass.
pub const LOOP_CONTINUE: &str = "YES";

// Placeholders in the few-shot examples, replaced by the configured delimiters.
const T: &str = "{T}";
const R: &str = "{R}";
const C: &str = "{C}";

const EXTRACTION_EXAMPLES: [&str; 2] = [
    r#"Example 1:

Entity_types: [athlete, event, location, record, equipment, date]
Text:
```
At the World Athletics Championship in Tokyo on July 28, 2024, Noah Carter broke the 100m sprint record wearing carbon-fiber spikes. The record came ten years after his Olympic debut in Paris 2014 and three months before his planned retirement in October 2024.
```

Output:
("entity"{T}"World Athletics Championship"{T}"event"{T}"An international track and field competition held in Tokyo."{T}"July 2024"){R}
("entity"{T}"Tokyo"{T}"location"{T}"Tokyo hosted the World Athletics Championship."){R}
("entity"{T}"Noah Carter"{T}"athlete"{T}"Noah Carter is a sprinter who broke the 100m sprint record on July 28, 2024."){R}
("entity"{T}"100m Sprint Record"{T}"record"{T}"The 100m sprint record, broken by Noah Carter at the championship."){R}
("entity"{T}"July 28, 2024"{T}"date"{T}"The day Noah Carter broke the 100m sprint record."{T}"July 28, 2024"){R}
("entity"{T}"Paris 2014"{T}"date"{T}"Noah Carter's Olympic debut, ten years before the record."{T}"2014"){R}
("entity"{T}"October 2024"{T}"date"{T}"Noah Carter's planned retirement, three months after the record."{T}"October 2024"){R}
("relationship"{T}"World Athletics Championship"{T}"Tokyo"{T}"The championship took place in Tokyo."{T}"spatial"{T}"during"{T}"event location"{T}8){R}
("relationship"{T}"Noah Carter"{T}"100m Sprint Record"{T}"Noah Carter set a new 100m sprint record."{T}"causal"{T}""{T}"athletic achievement, record-breaking"{T}10){R}
("relationship"{T}"Paris 2014"{T}"July 28, 2024"{T}"The Olympic debut came ten years before the record."{T}"temporal"{T}"before"{T}"career span"{T}7){R}
("relationship"{T}"July 28, 2024"{T}"October 2024"{T}"The record came three months before the planned retirement."{T}"temporal"{T}"before"{T}"career timeline, retirement"{T}9){R}
("temporal_sequence"{T}"Noah Carter career"{T}"Paris 2014, July 28, 2024, October 2024"{T}"Debut, record, then planned retirement."){R}
("content_keywords"{T}"athletics, sprinting, record-breaking, career milestones, athletic timeline"){C}
#############################"#,
    r#"Example 2:

Entity_types: [company, index, commodity, economic_policy, date]
Text:
```
The Global Tech Index fell 3.4% today after Nexon Technologies reported weak earnings on March 12, 2023. Crude oil kept climbing on supply constraints, while traders looked ahead to the Federal Reserve meeting expected to shape markets through Q3 2023.
```

Output:
("entity"{T}"Global Tech Index"{T}"index"{T}"An index of major technology stocks that fell 3.4% today."){R}
("entity"{T}"Nexon Technologies"{T}"company"{T}"A technology company that reported weak earnings on March 12, 2023."){R}
("entity"{T}"Crude Oil"{T}"commodity"{T}"Crude oil prices rose on supply constraints."){R}
("entity"{T}"Federal Reserve Meeting"{T}"economic_policy"{T}"An upcoming policy meeting expected to influence markets through Q3 2023."{T}"Q3 2023"){R}
("entity"{T}"March 12, 2023"{T}"date"{T}"The day Nexon Technologies reported its earnings."{T}"March 12, 2023"){R}
("relationship"{T}"Nexon Technologies"{T}"Global Tech Index"{T}"Nexon's earnings drop contributed to the index decline."{T}"causal"{T}"before"{T}"company impact, index movement"{T}8){R}
("relationship"{T}"March 12, 2023"{T}"Nexon Technologies"{T}"Nexon Technologies reported its earnings on March 12, 2023."{T}"temporal"{T}"simultaneous"{T}"earnings timing"{T}9){R}
("relationship"{T}"Federal Reserve Meeting"{T}"Global Tech Index"{T}"The meeting outcome is expected to move the index through Q3 2023."{T}"causal"{T}"after"{T}"policy impact, market outlook"{T}6){R}
("content_keywords"{T}"market downturn, earnings, commodities, monetary policy, financial timeline"){C}
#############################"#,
];

const KEYWORD_EXAMPLES: [&str; 3] = [
    r#"Example 1:

Query: "How has international trade influenced global economic stability since the 2008 financial crisis?"
################
Output:
{
  "high_level_keywords": ["International trade", "Global economic stability", "Economic impact"],
  "low_level_keywords": ["Trade agreements", "Tariffs", "Currency exchange"],
  "temporal_keywords": ["Since 2008", "Financial crisis", "Post-crisis period"]
}
#############################"#,
    r#"Example 2:

Query: "When did Noah Carter break the sprint record, and how long after his debut was it?"
################
Output:
{
  "high_level_keywords": ["Athletic achievement", "Career timeline"],
  "low_level_keywords": ["Noah Carter", "100m sprint record", "Olympic debut"],
  "temporal_keywords": ["Record date", "Time since debut", "Career duration"]
}
#############################"#,
    r#"Example 3:

Query: "How did quarterly earnings affect tech stocks during the 2023 downturn?"
################
Output:
{
  "high_level_keywords": ["Earnings reports", "Stock performance", "Market downturn"],
  "low_level_keywords": ["Tech stocks", "Quarterly earnings", "Investor response"],
  "temporal_keywords": ["Quarterly", "2023", "During the downturn"]
}
#############################"#,
];

fn with_delimiters(template: &str, config: &ExtractionConfig) -> String {
    template
        .replace(T, &config.tuple_delimiter)
        .replace(R, &config.record_delimiter)
        .replace(C, &config.completion_delimiter)
}

/// Few-shot examples rendered with the configured delimiters.
pub fn extraction_examples(config: &ExtractionConfig) -> String {
    EXTRACTION_EXAMPLES
        .iter()
        .map(|e| with_delimiters(e, config))
        .collect::<Vec<_>>()
        .join("\n")
}

/// First extraction pass over one rendered chunk.
pub fn entity_extraction_prompt(config: &ExtractionConfig, input_text: &str) -> String {
    let t = &config.tuple_delimiter;
    let entity_types = config.entity_types.join(", ");

    format!(
        r#"---Goal---
Given a text document and a list of entity types, identify all entities of those types and all relationships among them, paying special attention to dates, periods and the order of events.
Use {language} as output language.

---Steps---
1. Identify all entities. For each entity extract:
- entity_name: name of the entity, in the language of the input text, capitalized if English
- entity_type: one of [{entity_types}], or a more fitting type if none applies
- entity_description: comprehensive description of the entity's attributes and activities
- temporal_context: for dates and time-bound events, the timeframe (a date, a period, or "before"/"after" another event); leave empty otherwise
Format each entity as ("entity"{t}<entity_name>{t}<entity_type>{t}<entity_description>{t}<temporal_context>)

2. Among the entities from step 1, identify every pair (source_entity, target_entity) that is clearly related. For each pair extract:
- source_entity and target_entity: names as identified in step 1
- relationship_description: why the two entities are related
- relationship_type: a category such as "causal", "temporal", "spatial", "hierarchical" or "associative"
- temporal_relation: "before", "after", "during" or "simultaneous" when applicable, empty otherwise
- relationship_keywords: high-level words summarizing the nature of the relationship
- relationship_strength: a number scoring how strongly the entities are related
Format each relationship as ("relationship"{t}<source_entity>{t}<target_entity>{t}<relationship_description>{t}<relationship_type>{t}<temporal_relation>{t}<relationship_keywords>{t}<relationship_strength>)

3. Identify temporal sequences: ordered groups of entities or events with temporal significance.
Format each sequence as ("temporal_sequence"{t}<sequence_name>{t}<comma separated entities in temporal order>{t}<sequence_description>)

4. Identify high-level keywords summarizing the main concepts, themes and temporal aspects of the whole text.
Format them as ("content_keywords"{t}<high_level_keywords>)

5. Return all records from steps 1 to 4 in {language} as one list, using **{record}** as the list delimiter.

6. When finished, output {completion}

######################
---Examples---
######################
{examples}

#############################
---Real Data---
######################
Entity_types: [{entity_types}]
Text:
{input_text}
######################
Output:"#,
        language = config.language,
        record = config.record_delimiter,
        completion = config.completion_delimiter,
        examples = extraction_examples(config),
    )
}

/// Continuation ("gleaning") pass asking for missed records.
///
/// Uses the short relationship layout without type and temporal relation.
pub fn continue_extraction_prompt(config: &ExtractionConfig) -> String {
    let t = &config.tuple_delimiter;
    format!(
        r#"MANY entities and relationships were missed in the last extraction.

---Remember Steps---
1. Format each missed entity as ("entity"{t}<entity_name>{t}<entity_type>{t}<entity_description>)
   entity_type is one of [{entity_types}] or a more fitting type.
2. Format each missed relationship as ("relationship"{t}<source_entity>{t}<target_entity>{t}<relationship_description>{t}<relationship_keywords>{t}<relationship_strength>)
3. Format the content-level keywords as ("content_keywords"{t}<high_level_keywords>)
4. Return output in {language}, using **{record}** as the list delimiter.
5. When finished, output {completion}

---Output---

Add them below using the same format:"#,
        entity_types = config.entity_types.join(", "),
        language = config.language,
        record = config.record_delimiter,
        completion = config.completion_delimiter,
    )
}

/// Loop check after a continuation pass.
pub fn loop_check_prompt() -> &'static str {
    "---Goal---\n\nIt appears some entities may have still been missed.\n\n---Output---\n\nAnswer ONLY by `YES` OR `NO` if there are still entities that need to be added."
}

/// Merge several descriptions of one entity into a single chronological summary.
pub fn summarize_descriptions_prompt(
    language: &str,
    entity_name: &str,
    descriptions: &[String],
) -> String {
    let list = serde_json::to_string(descriptions).unwrap_or_else(|_| descriptions.join("\n"));
    format!(
        r#"You are responsible for writing one comprehensive summary of the data below, with special attention to time.
Given one or two entities and a list of descriptions of the same entity or group of entities, combine all of them into a single description organized in chronological order. Make sure to:

1. Include the information from every description
2. Keep events in proper temporal order, earliest first
3. State dates, periods and temporal markers wherever they are given
4. Make clear which states held when, and what led to what over time

If descriptions contradict each other on the timeline, keep the most temporally specific account and produce one coherent timeline.
Write in third person and include the entity names. The descriptions are listed in chronological order.

Use {language} as output language.

#######
---Data---
Entities: {entity_name}
Description List: {list}
#######
Output:
"#
    )
}

/// Classify a query into high-level, low-level and temporal keywords.
pub fn keywords_extraction_prompt(query: &str, history: &str) -> String {
    let examples = KEYWORD_EXAMPLES.join("\n");
    format!(
        r#"---Role---

You identify high-level, low-level and temporal keywords in the user's query and conversation history.

---Goal---

High-level keywords are overarching concepts or themes. Low-level keywords are specific entities, details or concrete terms. Temporal keywords are dates, periods, sequence markers ("before", "after", "during"), durations, rates of change and historical or future references.

---Instructions---

- Consider both the current query and the relevant conversation history
- Output JSON only, it will be parsed by a JSON parser
- The JSON object has exactly three keys, each an array of strings:
  - "high_level_keywords"
  - "low_level_keywords"
  - "temporal_keywords"
- Use an empty array when a tier has no keywords

######################
---Examples---
######################
{examples}

#############################
---Real Data---
######################
Conversation History:
{history}

Current Query: {query}
######################
Keep the same language as the query.
Output:
"#
    )
}

/// Answer from graph and chunk context.
pub fn rag_response_prompt(
    history: &str,
    context_data: &str,
    response_type: ResponseType,
    user_prompt: Option<&str>,
) -> String {
    let user_prompt = user_prompt.unwrap_or("n/a");
    format!(
        r#"---Role---

You answer questions about the Knowledge Graph and Document Chunks given in JSON below, with special attention to temporal relationships and chronology.

---Goal---

Write a concise answer using only the Knowledge Base, following the Response Rules and the conversation history.

When handling temporal information:
1. Each relationship has a "created_at" timestamp telling when the fact was acquired, not when it happened
2. Order events chronologically and state before/after relationships
3. When relationships conflict, decide whether the conflict is a change over time or contradictory data, and prefer the information most relevant to the query's timeframe
4. Do not automatically prefer the most recently acquired relationship
5. For time-specific questions, use dates in the content before acquisition timestamps

---Conversation History---
{history}

---Knowledge Graph and Document Chunks---
{context_data}

---Response Rules---

- Target format and length: {response_type}
- Use markdown with section headings, including timeline headings when relevant
- Respond in the language of the question
- List up to 5 reference sources at the end under "References", each as [KG] or [DC] followed by the file path or identifier
- If you don't know the answer, say so. Do not include information not present in the Knowledge Base
- Additional user prompt: {user_prompt}

Response:"#
    )
}

/// Answer from document chunks only.
pub fn naive_rag_response_prompt(
    history: &str,
    content_data: &str,
    response_type: ResponseType,
    user_prompt: Option<&str>,
) -> String {
    let user_prompt = user_prompt.unwrap_or("n/a");
    format!(
        r#"---Role---

You answer questions about the Document Chunks given in JSON below, with special attention to chronology and how information changed over time.

---Goal---

Write a concise answer using only the Document Chunks, following the Response Rules and the conversation history.

When handling temporal information:
1. Each chunk has a "created_at" timestamp telling when it was acquired
2. Organize information chronologically and state before/after relationships
3. When chunks conflict, decide whether the conflict is a change over time or contradictory data
4. For time-specific questions, use dates in the content before acquisition timestamps

---Conversation History---
{history}

---Document Chunks(DC)---
{content_data}

---Response Rules---

- Target format and length: {response_type}
- Use markdown with section headings, including timeline headings when relevant
- Respond in the language of the question
- List up to 5 reference sources at the end under "References", each as [DC] followed by the file path or identifier
- If you don't know the answer, say so. Do not include information not present in the Document Chunks
- Additional user prompt: {user_prompt}

Response:"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extraction_prompt_uses_configured_delimiters() {
        let config = ExtractionConfig {
            tuple_delimiter: "|~|".to_string(),
            record_delimiter: "%%".to_string(),
            ..Default::default()
        };
        let prompt = entity_extraction_prompt(&config, "Some text.");
        assert!(prompt.contains(r#"("entity"|~|"Tokyo""#));
        assert!(prompt.contains("%%"));
        assert!(prompt.contains("<|COMPLETE|>"));
        assert!(!prompt.contains("{T}"));
        assert!(prompt.ends_with("Some text.\n######################\nOutput:"));
    }

    #[test]
    fn test_examples_parse_cleanly() {
        let config = ExtractionConfig::default();
        let parser = crate::extraction::RecordParser::new(&config);
        for example in EXTRACTION_EXAMPLES {
            let rendered = with_delimiters(example, &config);
            let output = rendered
                .split("Output:\n")
                .nth(1)
                .unwrap()
                .trim_end_matches('#')
                .trim();
            let outcome = parser.parse(output);
            assert!(outcome.anomalies.is_empty(), "{:?}", outcome.anomalies);
            assert!(outcome.relationships().count() >= 3);
        }
    }

    #[test]
    fn test_summarize_prompt_lists_descriptions_in_order() {
        let prompt = summarize_descriptions_prompt(
            "English",
            "Noah Carter",
            &["Debuted in 2014.".to_string(), "Set record in 2024.".to_string()],
        );
        assert!(prompt.contains(r#"["Debuted in 2014.","Set record in 2024."]"#));
        assert!(prompt.contains("Entities: Noah Carter"));
    }

    #[test]
    fn test_rag_prompt_defaults_user_prompt() {
        let prompt = rag_response_prompt("", "[]", ResponseType::SingleLine, None);
        assert!(prompt.contains("Target format and length: Single Line"));
        assert!(prompt.contains("Additional user prompt: n/a"));
    }
}
