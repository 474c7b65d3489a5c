use super::{ModelClient, ModelRequest};
use crate::errors::{AppError, AppResult};
use crate::models::{Language, RefineMode};
use std::sync::Arc;

const TITLE_SAMPLING: (f32, u32) = (0.4, 64);
const BODY_SAMPLING: (f32, u32) = (0.6, 1024);

/// Rewrites work-log text in one of the fixed styles.
pub struct Refiner {
    client: Arc<dyn ModelClient>,
}

impl Refiner {
    pub fn new(client: Arc<dyn ModelClient>) -> Self {
        Self { client }
    }

    pub async fn refine(&self, text: &str, mode: RefineMode, language: Language) -> AppResult<String> {
        if text.trim().is_empty() {
            return Err(AppError::Validation("Text to refine cannot be empty".to_string()));
        }

        let (temperature, max_tokens) = if mode == RefineMode::Title {
            TITLE_SAMPLING
        } else {
            BODY_SAMPLING
        };
        let request = ModelRequest::new(text)
            .with_system(system_prompt(mode, language))
            .with_sampling(temperature, max_tokens);
        let reply = self.client.generate(request).await?;
        let reply = reply.trim();
        tracing::debug!(mode = ?mode, input_len = text.len(), output_len = reply.len(), "refined text");
        if reply.is_empty() {
            return Ok(text.to_string());
        }
        Ok(reply.to_string())
    }
}

fn system_prompt(mode: RefineMode, language: Language) -> String {
    let thai = language == Language::Th;
    let instruction = match (mode, thai) {
        (RefineMode::Title, true) => {
            return "สร้างชื่องานสั้นๆ กระชับ ไม่เกิน 8 คำ จากเนื้อหาต่อไปนี้ ตอบเป็นภาษาไทยเท่านั้น ไม่ต้องขึ้นต้นด้วยเครื่องหมายหรืออีโมจิ ตอบมาแค่ชื่องานอย่างเดียว".to_string();
        }
        (RefineMode::Title, false) => {
            return "Generate a short task name, max 8 words, from the following content. Reply in English only. No emoji, no punctuation prefix. Just the task name.".to_string();
        }
        (RefineMode::Tighten, true) => "ปรับแต่งข้อความบันทึกงานต่อไปนี้ให้เป็นภาษาที่เป็นทางการ กระชับ และเป็นมืออาชีพ แก้ไขไวยากรณ์และใช้คำศัพท์ที่เหมาะสม",
        (RefineMode::Tighten, false) => "Refine this work log into professional, formal, and concise language. Correct grammar and use industry-standard terminology.",
        (RefineMode::Expand, true) => "ขยายความข้อความบันทึกงานต่อไปนี้โดยเพิ่มรายละเอียดทางเทคนิค วิธีการที่ใช้ และผลกระทบที่เกิดขึ้น ให้เหมาะสำหรับรายงานประจำวัน",
        (RefineMode::Expand, false) => "Expand this work log with additional technical details, methods used, and potential impacts. Make it detailed for a daily progress report.",
        (RefineMode::Structure, true) => "จัดระเบียบข้อความบันทึกงานต่อไปนี้ให้อยู่ในรูปแบบรายการที่ชัดเจน จัดกลุ่มงานที่เกี่ยวข้องและเรียงลำดับตามความสำคัญ",
        (RefineMode::Structure, false) => "Organize this work log into a clear, structured list. Group related tasks and order by priority.",
        (RefineMode::Condense, true) => "สรุปข้อความต่อไปนี้ให้สั้น กระชับ เข้าใจง่าย ไม่เกิน 3 บรรทัด เลือกเฟ้นเฉพาะส่วนที่สำคัญที่สุด",
        (RefineMode::Condense, false) => "Summarize this work log into a short, easy-to-understand version. Max 3 lines. Keep only the most important points.",
    };

    let template = if thai {
        "ตอบในรูปแบบรายงานงานรายวันดังนี้:\n✅ งานที่ทำ:\n- [รายละเอียดงาน]\n\n💡 หมายเหตุ / ผลลัพธ์:\n- [บันทึกเพิ่มเติม หากมี]\n\nตอบเป็นภาษาไทยเท่านั้น ไม่ต้องใส่วันที่ ไม่ต้องใส่ markdown code block"
    } else {
        "Reply in this daily work log format:\n✅ Tasks Completed:\n- [Task detail]\n\n💡 Notes / Results:\n- [Additional notes if any]\n\nReply in English only. Do not include the date. No markdown code blocks."
    };

    format!(
        "You are a professional technical writer and daily work log assistant. {}\n\n{}",
        instruction, template
    )
}

#[cfg(test)]
mod tests {
    use super::Refiner;
    use crate::adapters::{ModelClient, ModelRequest};
    use crate::errors::{AppError, AppResult, RemoteFailure};
    use crate::models::{Language, RefineMode};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct Recording {
        reply: String,
        fail: bool,
        seen: Mutex<Vec<ModelRequest>>,
    }

    #[async_trait]
    impl ModelClient for Recording {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn generate(&self, request: ModelRequest) -> AppResult<String> {
            self.seen.lock().expect("seen").push(request);
            if self.fail {
                return Err(AppError::remote("recording", RemoteFailure::Auth, "bad key"));
            }
            Ok(self.reply.clone())
        }
    }

    #[tokio::test]
    async fn title_mode_uses_short_sampling() {
        let client = Arc::new(Recording {
            reply: "  Replace pump seal \n".to_string(),
            ..Recording::default()
        });
        let refiner = Refiner::new(client.clone());
        let title = refiner
            .refine("changed the seal on pump 3", RefineMode::Title, Language::En)
            .await
            .expect("refine");
        assert_eq!(title, "Replace pump seal");

        let seen = client.seen.lock().expect("seen");
        assert_eq!(seen[0].max_tokens, Some(64));
        assert!(seen[0].system.as_deref().unwrap_or("").contains("max 8 words"));
    }

    #[tokio::test]
    async fn body_modes_carry_daily_log_template() {
        let client = Arc::new(Recording {
            reply: "ok".to_string(),
            ..Recording::default()
        });
        Refiner::new(client.clone())
            .refine("ซ่อมปั๊ม", RefineMode::Structure, Language::Th)
            .await
            .expect("refine");
        let seen = client.seen.lock().expect("seen");
        assert_eq!(seen[0].max_tokens, Some(1024));
        assert!(seen[0].system.as_deref().unwrap_or("").contains("✅ งานที่ทำ:"));
    }

    #[tokio::test]
    async fn empty_reply_returns_input_and_failures_propagate() {
        let quiet = Refiner::new(Arc::new(Recording::default()));
        assert_eq!(
            quiet.refine("keep me", RefineMode::Condense, Language::En).await.expect("refine"),
            "keep me"
        );

        let failing = Refiner::new(Arc::new(Recording {
            fail: true,
            ..Recording::default()
        }));
        let error = failing
            .refine("text", RefineMode::Expand, Language::En)
            .await
            .expect_err("propagates");
        assert_eq!(error.status_code(), 401);

        let error = quiet.refine("   ", RefineMode::Expand, Language::En).await.expect_err("empty");
        assert!(matches!(error, AppError::Validation(_)));
    }
}
