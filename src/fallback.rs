//! Canned fallback replies for when generation is exhausted.
//!
//! Keyword-matched by topic so the customer still gets something useful
//! when the AI path is down: price, hours, and product questions each
//! have their own message, everything else gets the generic one. All
//! carry the store contact so a human can pick up the thread.

const FALLBACK_PRICE: &str = "No momento não consigo consultar os preços por aqui, mas todos os valores atualizados estão no nosso site! Você também pode falar com a gente pelo (84) 99999-0000 ou comprar direto no site: https://dinamicasports.com.br";

const FALLBACK_HOURS: &str = "Nosso horário de funcionamento é de segunda a sábado, das 9h às 18h. Você também pode falar com a gente pelo (84) 99999-0000 ou comprar direto no site: https://dinamicasports.com.br";

const FALLBACK_PRODUCT: &str = "No momento não consigo consultar o catálogo por aqui, mas você encontra todos os produtos disponíveis no nosso site! Você também pode falar com a gente pelo (84) 99999-0000 ou comprar direto no site: https://dinamicasports.com.br";

const FALLBACK_GENERIC: &str = "Desculpe, estou com um pequeno problema técnico. Um atendente entrará em contato em breve para te ajudar! Você também pode falar com a gente pelo (84) 99999-0000 ou comprar direto no site: https://dinamicasports.com.br";

/// Sent when delivery itself is exhausted: one best-effort message, no
/// further retries.
pub const TECHNICAL_DIFFICULTIES: &str = "Desculpe, estou com um pequeno problema técnico. Um atendente entrará em contato em breve para te ajudar!";

const PRICE_KW: &[&str] = &["preço", "preco", "valor", "custa", "quanto"];
const HOURS_KW: &[&str] = &["horário", "horario", "hora", "funciona", "aberto", "fecha"];
const PRODUCT_KW: &[&str] = &["produto", "tênis", "tenis", "tamanho", "modelo", "estoque", "camisa", "chuteira"];

fn kw_match(msg: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|kw| msg.contains(kw))
}

/// Pick the canned reply matching the customer's question.
pub fn reply_for(message: &str) -> &'static str {
    let msg = message.trim().to_lowercase();
    if kw_match(&msg, HOURS_KW) {
        FALLBACK_HOURS
    } else if kw_match(&msg, PRICE_KW) {
        FALLBACK_PRICE
    } else if kw_match(&msg, PRODUCT_KW) {
        FALLBACK_PRODUCT
    } else {
        FALLBACK_GENERIC
    }
}
