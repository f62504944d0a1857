use std::fmt::Write;

use crate::models::requirement::{self, Availability, Performance, Scalability, Security};

/// Fixed system role sent with every completion request.
pub const SYSTEM_PROMPT: &str = "Eres un experto en arquitectura de software. \
Diseñas sistemas escalables y explicas cada decisión con claridad. \
Respondes siempre en Markdown y usas Mermaid para los diagramas.";

/// Separator the model must place between response sections.
pub const SECTION_DELIMITER: &str = "---";

/// Build the user prompt for one requirement.
pub fn build_prompt(req: &requirement::Model) -> String {
    let mut prompt = String::with_capacity(4096);

    prompt.push_str(
        "Diseña la arquitectura del siguiente sistema a partir de sus requisitos.\n\n",
    );

    // Writing into a String cannot fail
    let _ = writeln!(prompt, "## Sistema: {}", req.name);
    let _ = writeln!(prompt, "Tipo de aplicación: {}", req.app_type.as_str());
    let _ = writeln!(prompt, "Descripción: {}\n", or_unspecified(&req.description));

    prompt.push_str("### Requisitos funcionales\n");
    if req.functional_requirements.0.is_empty() {
        prompt.push_str("- No especificados\n");
    }
    for (index, item) in req.functional_requirements.0.iter().enumerate() {
        let _ = writeln!(prompt, "{}. {}", index + 1, item.trim());
    }

    let nfr = &req.non_functional_requirements;
    prompt.push_str("\n### Requisitos no funcionales\n");
    let _ = writeln!(prompt, "- Escalabilidad: {}", scalability_label(nfr.scalability));
    let _ = writeln!(prompt, "- Disponibilidad: {}", availability_label(nfr.availability));
    let _ = writeln!(prompt, "- Seguridad: {}", security_label(nfr.security));
    let _ = writeln!(prompt, "- Rendimiento: {}", performance_label(nfr.performance));

    let tech = &req.tech_preferences;
    prompt.push_str("\n### Preferencias tecnológicas\n");
    let _ = writeln!(prompt, "- Lenguaje backend: {}", or_unspecified(&tech.backend_language));
    let _ = writeln!(prompt, "- Frameworks: {}", join_or_unspecified(&tech.frameworks));
    let _ = writeln!(prompt, "- Bases de datos: {}", join_or_unspecified(&tech.databases));
    let _ = writeln!(
        prompt,
        "- Estilo de arquitectura: {}",
        or_unspecified(&tech.architecture_style)
    );

    let _ = writeln!(
        prompt,
        "\n### Contexto adicional\n{}\n",
        or_unspecified(&req.additional_context)
    );

    prompt.push_str(
        "## Secciones obligatorias\n\
         1. Comprensión del problema\n\
         2. Arquitectura de alto nivel\n\
         3. Diseño detallado\n\
         4. Trade-offs\n\
         5. Validación\n\n\
         ## Diagramas obligatorios\n\
         1. Diagrama de arquitectura\n\
         2. Diagrama entidad-relación de la base de datos\n\
         3. Diagrama de secuencia del flujo principal\n\n\
         ## Formato de respuesta\n\
         Cada diagrama debe tener:\n\
         - Un título en la primera línea\n\
         - Una descripción breve\n\
         - Un bloque de código ```mermaid con la definición del diagrama\n\
         - Una sección \"## Explicación\" con la explicación detallada\n\n",
    );
    let _ = write!(
        prompt,
        "Separa cada sección y cada diagrama con una línea que contenga únicamente `{}`.\n",
        SECTION_DELIMITER
    );

    prompt
}

fn or_unspecified(value: &str) -> &str {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        "No especificado"
    } else {
        trimmed
    }
}

fn join_or_unspecified(values: &[String]) -> String {
    let joined = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    if joined.is_empty() {
        "No especificado".to_string()
    } else {
        joined
    }
}

fn scalability_label(value: Scalability) -> &'static str {
    match value {
        Scalability::Low => "baja",
        Scalability::Medium => "media",
        Scalability::High => "alta",
    }
}

fn availability_label(value: Availability) -> &'static str {
    match value {
        Availability::Standard => "estándar",
        Availability::High => "alta",
        Availability::Critical => "crítica",
    }
}

fn security_label(value: Security) -> &'static str {
    match value {
        Security::Basic => "básica",
        Security::Standard => "estándar",
        Security::High => "alta",
    }
}

fn performance_label(value: Performance) -> &'static str {
    match value {
        Performance::Standard => "estándar",
        Performance::High => "alto",
        Performance::Critical => "crítico",
    }
}
