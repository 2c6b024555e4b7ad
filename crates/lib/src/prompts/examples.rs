//! # Example Generation Prompts

use crate::types::SampleData;

pub const EXAMPLE_GENERATION_SYSTEM_PROMPT: &str = "You generate training examples that pair natural language questions with the SQL that answers them. You return only JSON.";

/// Placeholders: `{count}`, `{dialect}`, `{schema}`, `{samples}`
pub const EXAMPLE_GENERATION_USER_PROMPT: &str = r#"Generate {count} diverse, realistic natural language to SQL query examples based on this database schema.

{schema}

Sample Data:
{samples}

Requirements:
1. Create {count} different examples covering various query types:
   - Simple SELECT queries (e.g., "Show all customers")
   - COUNT queries (e.g., "How many orders were placed?")
   - WHERE clauses with filters (e.g., "Find customers in New York")
   - JOIN queries (e.g., "Show orders with customer names")
   - GROUP BY and aggregations (e.g., "Total sales by customer")
   - ORDER BY and LIMIT (e.g., "Top 10 customers by revenue")
   - Date/time filters and multiple conditions
   - Various complexity levels (simple to advanced)
2. Make queries realistic and business-oriented
3. Use actual column names from the schema
4. Ensure SQL queries are valid {dialect} syntax
5. Cover all tables in the schema

Return ONLY a valid JSON array with this exact format:
[
  {"natural_language_query": "the question in plain English", "sql_query": "the corresponding SQL query"}
]

Important:
- Return ONLY the JSON array, no additional text or explanation
- Do NOT use markdown code blocks
- Do NOT use dollar signs ($) in queries"#;

pub fn example_generation_user_prompt(
    count: usize,
    dialect: &str,
    raw_schema: &str,
    sample_data: &SampleData,
) -> String {
    let samples = serde_json::to_string_pretty(sample_data).unwrap_or_else(|_| "{}".to_string());
    EXAMPLE_GENERATION_USER_PROMPT
        .replace("{count}", &count.to_string())
        .replace("{dialect}", dialect)
        .replace("{schema}", raw_schema)
        .replace("{samples}", &samples)
}
