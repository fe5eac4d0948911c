//! Static fallback data
//!
//! Every capability degrades to something from here when all providers fail,
//! so callers never see an empty result.

use crate::domain::types::{Coordinates, Landmark, PlaceMatch, SubAttraction};

/// Nearby landmarks around the demo coordinate (central Beijing)
pub fn nearby_landmarks() -> Vec<Landmark> {
    vec![
        Landmark::new("m1", "天安门广场", "世界上最大的城市中心广场，是北京的心脏地带，可容纳100万人举行盛大集会。")
            .with_distance("500m")
            .with_kind("著名景点"),
        Landmark::new("m2", "国家博物馆", "中华文物收藏量最丰富的博物馆，记载着中华民族五千年的文明历史。")
            .with_distance("800m")
            .with_kind("博物馆"),
        Landmark::new(
            "m3",
            "故宫博物院",
            "中国明清两代的皇家宫殿，旧称紫禁城，是世界上现存规模最大、保存最完整的木质结构古建筑之一。",
        )
        .with_distance("1.2km")
        .with_kind("世界遗产"),
        Landmark::new("m4", "景山公园", "位于故宫北面，是元、明、清三代的御苑，山顶可俯瞰故宫全景。")
            .with_distance("1.5km")
            .with_kind("公园"),
        Landmark::new("m5", "王府井大街", "具有数百年悠久历史的商业街，聚集了众多中华老字号和现代商场。")
            .with_distance("2.0km")
            .with_kind("商业街"),
    ]
}

/// Stub search results echoing the query
pub fn search_results(query: &str) -> Vec<Landmark> {
    vec![
        Landmark::new("s1", format!("{} (模拟结果)", query), "这是模拟的搜索结果，因为未配置国内API。")
            .with_distance("-")
            .with_kind("模拟"),
        Landmark::new("s2", "周边推荐景点", "相关联的推荐地点").with_distance("-").with_kind("推荐"),
    ]
}

pub fn sub_attractions() -> Vec<SubAttraction> {
    vec![
        SubAttraction {
            id: "s1".to_string(),
            name: "主要殿堂".to_string(),
            description: "这里是景点的核心区域，建筑宏伟。".to_string(),
            kind: "建筑".to_string(),
        },
        SubAttraction {
            id: "s2".to_string(),
            name: "花园区".to_string(),
            description: "景色宜人，适合休憩。".to_string(),
            kind: "园林".to_string(),
        },
    ]
}

pub fn narration(landmark_name: &str) -> String {
    format!(
        "欢迎来到{}。这是一个非常值得游览的地方，拥有悠久的历史和独特的文化魅力。请您尽情欣赏这里的美景。",
        landmark_name
    )
}

pub const IDENTIFY_UNAVAILABLE_TEXT: &str = "识别服务暂时不可用，但这个地方看起来很有历史感。";

/// Landmark returned when identification is unavailable
pub fn unidentified_landmark(user_query: Option<&str>) -> Landmark {
    let name = if user_query.is_some_and(|q| q.contains('塔')) { "古塔" } else { "未知景点" };
    Landmark::new("err", name, "自动识别演示").with_distance("当前").with_kind("识别")
}

/// Demo relocation target for queries about the palace museum or Beijing
pub fn place_for_query(query: &str) -> Option<PlaceMatch> {
    if query.contains("故宫") || query.contains("北京") {
        Some(PlaceMatch {
            coords: Coordinates::new(39.9163, 116.3972),
            address: "北京市东城区 (演示)".to_string(),
        })
    } else {
        None
    }
}

/// Spoken when narration is unavailable and the landmark carries no description
pub fn local_placeholder(name: &str) -> String {
    format!("正在播放示例讲解：{}", name)
}
