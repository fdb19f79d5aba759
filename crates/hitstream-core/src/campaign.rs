use serde::{Deserialize, Serialize};

use crate::request::IngestRequest;

/// Standard UTM campaign parameters, stored verbatim after trimming.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtmParams {
    pub source: String,
    pub medium: String,
    pub campaign: String,
    pub content: String,
    pub term: String,
}

impl UtmParams {
    pub fn from_request(req: &IngestRequest) -> Self {
        UtmParams {
            source: req.query_param("utm_source").trim().to_string(),
            medium: req.query_param("utm_medium").trim().to_string(),
            campaign: req.query_param("utm_campaign").trim().to_string(),
            content: req.query_param("utm_content").trim().to_string(),
            term: req.query_param("utm_term").trim().to_string(),
        }
    }
}

/// OTM campaign parameters — the onsite counterpart to UTM, used to attribute
/// clicks on internal placements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OtmParams {
    pub source: String,
    pub medium: String,
    pub campaign: String,
    pub position: String,
}

impl OtmParams {
    pub fn from_request(req: &IngestRequest) -> Self {
        OtmParams {
            source: req.query_param("otm_source").trim().to_string(),
            medium: req.query_param("otm_medium").trim().to_string(),
            campaign: req.query_param("otm_campaign").trim().to_string(),
            position: req.query_param("otm_position").trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_and_trims_utm_params() {
        let mut req = IngestRequest::get("/");
        req.query = vec![
            ("utm_source".to_string(), " newsletter ".to_string()),
            ("utm_medium".to_string(), "email".to_string()),
            ("utm_campaign".to_string(), "spring".to_string()),
            ("utm_content".to_string(), "top".to_string()),
            ("utm_term".to_string(), "analytics".to_string()),
        ];
        let utm = UtmParams::from_request(&req);
        assert_eq!(utm.source, "newsletter");
        assert_eq!(utm.medium, "email");
        assert_eq!(utm.campaign, "spring");
        assert_eq!(utm.content, "top");
        assert_eq!(utm.term, "analytics");
    }

    #[test]
    fn missing_params_stay_empty() {
        let req = IngestRequest::get("/");
        assert_eq!(UtmParams::from_request(&req), UtmParams::default());
        assert_eq!(OtmParams::from_request(&req), OtmParams::default());
    }

    #[test]
    fn reads_otm_params() {
        let mut req = IngestRequest::get("/");
        req.query = vec![
            ("otm_source".to_string(), "home".to_string()),
            ("otm_position".to_string(), "banner-2 ".to_string()),
        ];
        let otm = OtmParams::from_request(&req);
        assert_eq!(otm.source, "home");
        assert_eq!(otm.position, "banner-2");
        assert_eq!(otm.medium, "");
    }
}
