//! 整图求值：运动匹配输出脚目标，下游两骨 IK 消费

use std::sync::Arc;

use avatar_engine::animation::{MotionDatabase, MotionMatching, MotionRow, TwoBoneIk, ROW_SIZE};
use avatar_engine::{AnimContext, AnimGraph, AnimNode, AnimNodeKind, AnimVariantMap, Joint, Pose, Skeleton};
use glam::Vec3;

const LEFT_FOOT_TARGET: Vec3 = Vec3::new(0.1, 0.2, 0.1);

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn leg_skeleton() -> Arc<Skeleton> {
    Arc::new(
        Skeleton::new(vec![
            Joint::new("Root", -1, Pose::IDENTITY),
            Joint::new("Hips", 0, Pose::from_translation(Vec3::new(0.0, 0.9, 0.0))),
            Joint::new("LeftUpLeg", 1, Pose::from_translation(Vec3::new(0.1, -0.05, 0.0))),
            Joint::new("LeftLeg", 2, Pose::from_translation(Vec3::new(0.0, -0.4, 0.02))),
            Joint::new("LeftFoot", 3, Pose::from_translation(Vec3::new(0.0, -0.4, -0.02))),
        ])
        .unwrap(),
    )
}

/// 原地站立的数据库：髋部 (0, 0.9, 0)，左脚抬起到 LEFT_FOOT_TARGET
fn standing_database(rows: usize) -> MotionDatabase {
    let rows = (0..rows)
        .map(|frame| {
            let mut data = [0.0f32; ROW_SIZE];
            data[0] = frame as f32;
            data[2] = 0.9;
            data[7] = 1.0;
            data[8..11].copy_from_slice(&LEFT_FOOT_TARGET.to_array());
            data[14] = 1.0;
            data[15] = -0.1;
            data[21] = 1.0;
            MotionRow::from_array(data)
        })
        .collect();
    MotionDatabase::from_rows(rows)
}

fn leg_ik() -> TwoBoneIk {
    let mut ik = TwoBoneIk::new("LeftUpLeg", "LeftLeg", "LeftFoot", "leftFootPosition", "leftFootRotation");
    ik.mid_target_var = "leftKneeTarget".to_string();
    ik
}

#[test]
fn test_motion_matching_feeds_two_bone_ik() {
    init_logger();
    let skeleton = leg_skeleton();
    let root = AnimNode::new("leftFootIK", AnimNodeKind::TwoBoneIk(leg_ik())).with_child(AnimNode::new(
        "locomotion",
        AnimNodeKind::MotionMatching(Box::new(MotionMatching::new(standing_database(10), "Hips"))),
    ));
    let mut graph = AnimGraph::new(root);
    graph.set_skeleton(skeleton.clone());

    let mut vars = AnimVariantMap::new();
    let ctx = AnimContext::default();
    let poses = graph.evaluate(&mut vars, &ctx, 1.0 / 60.0).to_vec();

    assert_eq!(poses.len(), skeleton.joint_count());
    assert!(vars.has("leftFootPosition"));
    assert!(vars.has("rightFootPosition"));
    assert!(vars.has("motionMatchingFrame"));
    assert!(vars.has("leftKneeTarget"));

    let absolute = skeleton.convert_relative_to_absolute(&poses);
    assert!(absolute[1].translation.abs_diff_eq(Vec3::new(0.0, 0.9, 0.0), 1e-5));
    let foot = absolute[4].translation;
    assert!(
        foot.abs_diff_eq(LEFT_FOOT_TARGET, 1e-3),
        "脚应到达运动匹配给出的目标: {:?}",
        foot
    );

    // 骨长保持不变
    let thigh = (absolute[3].translation - absolute[2].translation).length();
    let shin = (absolute[4].translation - absolute[3].translation).length();
    let default_abs = skeleton.convert_relative_to_absolute(skeleton.relative_default_poses());
    let default_thigh = (default_abs[3].translation - default_abs[2].translation).length();
    let default_shin = (default_abs[4].translation - default_abs[3].translation).length();
    assert!((thigh - default_thigh).abs() < 1e-3);
    assert!((shin - default_shin).abs() < 1e-3);
}

#[test]
fn test_missing_database_degrades_to_default_pose() {
    init_logger();
    let skeleton = leg_skeleton();
    let root = AnimNode::new("leftFootIK", AnimNodeKind::TwoBoneIk(leg_ik())).with_child(AnimNode::new(
        "locomotion",
        AnimNodeKind::MotionMatching(Box::new(MotionMatching::from_file(
            "/nonexistent/motion_database.json",
            "Hips",
        ))),
    ));
    let mut graph = AnimGraph::new(root);
    graph.set_skeleton(skeleton.clone());

    let mut vars = AnimVariantMap::new();
    let ctx = AnimContext::default();
    for _ in 0..3 {
        let poses = graph.evaluate(&mut vars, &ctx, 1.0 / 60.0);
        assert_eq!(poses.len(), skeleton.joint_count());
        for (out, default) in poses.iter().zip(skeleton.relative_default_poses()) {
            assert!(out.abs_diff_eq(default, 1e-4), "{:?} != {:?}", out, default);
        }
    }
    assert!(!vars.has("leftFootPosition"));
}
