use super::validation::Modality;
use crate::good_examples::GoodExample;

/// Fixed clinical rules sent as the system prompt on every call.
pub const DRAFTING_SYSTEM_PROMPT: &str = "Eres un asistente de radiología.
Reglas:
- Describe hallazgos y redacta borradores estructurados.
- NO des diagnóstico definitivo.
- Puedes sugerir correlación clínica o comparación con previos cuando sea razonable.
- Si algo es incierto, dilo con lenguaje probabilístico.
- NO recomiendes tratamiento.
- NO inventes datos no proporcionados (edad, contraste, dosis, etc.).
Salida en español, respetando el formato de la plantilla.
";

/// The all-empty edit JSON the model must return when it has nothing to say.
pub const MINIMAL_EDIT_JSON: &str = r#"{"remove":[],"replace":[],"add_findings":[],"lesiometro_missing":[],"confidence_scores":{},"conclusion":{"positives":[],"impression":[],"ddx":[],"recommendations":[]}}"#;

const SCHEMA_REFERENCE: &str = r#"{
    "remove": ["línea exacta a eliminar"],
    "replace": [{"from": "incorrecto", "to": "correcto"}],
    "add_findings": ["hallazgo 1", "hallazgo 2"],
    "lesiometro_missing": ["componente no evaluable"],
    "confidence_scores": {"finding1": 0.95, "finding2": 0.6},
    "conclusion": {
        "positives": ["solo anormales"],
        "impression": ["probabilístico"],
        "ddx": ["dx1", "dx2"],
        "recommendations": ["correlación clínica"]
    }
}"#;

/// Number of most recent good examples included in the prompt.
pub const FEWSHOT_COUNT: usize = 2;

const RULE_WIDTH: usize = 70;

/// Clinical context of one request.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    pub modality: Modality,
    pub region: &'a str,
    pub indication: &'a str,
    pub extras: &'a str,
}

/// Descriptors the model should report for a modality.
pub fn modality_guide(modality: Modality) -> &'static str {
    match modality {
        Modality::Tc => {
            "DESCRIPTORES CRÍTICOS PARA TC:
- Densidad en Unidades Hounsfield (UH) si es relevante
- Realce post-contraste (si aplica: arterial, portal, portal tardío)
- Patrón de distribución (segmentario, lobar, difuso)
- Efecto de masa y desplazamiento de estructuras adyacentes
- Bordes (bien definidos vs infiltrantes)
"
        }
        Modality::Rm => {
            "DESCRIPTORES CRÍTICOS PARA RM:
- Señal T1 (hipointensa, isointensa, hiperintensa)
- Señal T2/FLAIR (hiper/hipointensa)
- Restricción en DWI (si hay)
- Realce con gadolinio (patrón: periférico, homogéneo, progresivo)
- Cambios en espectroscopia si está disponible
"
        }
        Modality::Rx => {
            "DESCRIPTORES CRÍTICOS PARA RX:
- Densidad radiológica (vidrio esmerilado, consolidación, cavitación)
- Distribución (segmentaria, lobar, difusa)
- Presencia de broncograma aéreo
- Bordes (nítidos vs mal definidos)
- Localización precisa (lóbulo, segmento, región)
"
        }
        Modality::Us => {
            "DESCRIPTORES CRÍTICOS PARA ECOGRAFÍA:
- Ecogenicidad (hipoecogénico, isoecogénico, hiperecoico)
- Compresibilidad y elastografía si aplica
- Vascularidad en Doppler (si disponible)
- Cambios dinámicos con maniobras
"
        }
        Modality::Other => {
            "DESCRIPTORES ESTÁNDAR:
- Localización precisa
- Morfología y tamaño
- Densidad/señal/ecogenicidad
- Bordes y relaciones
- Cambios respecto a estudios previos
"
        }
    }
}

/// Few-shot block from the last [`FEWSHOT_COUNT`] examples, most recent
/// user-approved ones last.
pub fn format_fewshot(examples: &[GoodExample]) -> String {
    let rule = "=".repeat(RULE_WIDTH);
    let sep = "-".repeat(RULE_WIDTH);
    let mut text = format!("\n📚 EJEMPLOS (el modelo aprende de estos patrones):\n{rule}\n");

    let start = examples.len().saturating_sub(FEWSHOT_COUNT);
    for (i, ex) in examples[start..].iter().enumerate() {
        let body = serde_json::to_string_pretty(&ex.example).unwrap_or_else(|_| "{}".into());
        text.push_str(&format!("\nEJEMPLO {}: {}\n{body}\n{sep}", i + 1, ex.label));
    }

    text
}

/// Generation prompt. `image_token` is prefixed only on the manual image
/// path; backends that attach the image themselves get `None`.
pub fn build_prompt(
    ctx: &PromptContext<'_>,
    template_text: &str,
    examples: &[GoodExample],
    image_token: Option<&str>,
) -> String {
    let token_prefix = match image_token {
        Some(token) if !token.is_empty() => format!("{token}\n\n"),
        _ => String::new(),
    };
    let fewshot = format_fewshot(examples);
    let guide = modality_guide(ctx.modality);

    format!(
        r#"{token_prefix}TAREA: Eres radiólogo. Edita esta plantilla basándote en la imagen. Devuelve SOLO JSON válido dentro de un bloque ```json```.

PLANTILLA A EDITAR:
--- PLANTILLA ---
{template_text}
--- FIN PLANTILLA ---

INSTRUCCIONES CRÍTICAS:
- Elimina líneas que contradicen la imagen (remove)
- Reemplaza lo incorrecto (replace)
- Agrega hallazgos anormales nuevos (add_findings)
- Si no ves algo → regístralo en "lesiometro_missing"
- Conclusión: solo positivo/anormal, NUNCA diagnóstico definitivo
- NO inventes medidas, edad, contraste, etc.

CONTEXTO:
- Modalidad: {modality}
- Región: {region}
- Indicación: {indication}
- Extras: {extras}

{guide}
EJEMPLOS A SEGUIR:
{fewshot}

DEVUELVE JSON EXACTO (SIN EXPLICACIONES) y formátalo como bloque de código:
```json
{MINIMAL_EDIT_JSON}
```

ESQUEMA JSON COMPLETO (referencia):
```json
{SCHEMA_REFERENCE}
```
"#,
        modality = ctx.modality,
        region = ctx.region.trim(),
        indication = ctx.indication.trim(),
        extras = ctx.extras.trim(),
    )
}

/// Prompt asking the model to turn a non-JSON draft into the edit JSON.
pub fn build_repair_prompt(draft: &str, template_text: &str) -> String {
    format!(
        r#"TAREA: Convierte el borrador de informe en un JSON de ediciones sobre la plantilla.
Devuelve SOLO JSON válido, sin explicaciones, formateado como bloque ```json```.
Si no puedes, devuelve EXACTAMENTE este JSON mínimo:
```json
{MINIMAL_EDIT_JSON}
```

PLANTILLA A EDITAR:
--- PLANTILLA ---
{template_text}
--- FIN PLANTILLA ---

BORRADOR DEL MODELO (PARA CONVERTIR):
--- BORRADOR ---
{draft}
--- FIN BORRADOR ---

DEVUELVE JSON EXACTO (SIN EXPLICACIONES):
```json
{SCHEMA_REFERENCE}
```
"#
    )
}
